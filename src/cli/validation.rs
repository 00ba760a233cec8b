use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(rate) = args.rate {
        if rate == 0 {
            return Err("invalid rate, expected positive integer".to_string());
        }
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("invalid workers, expected positive integer".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive number of seconds".to_string());
        }
    }
    if let Some(raw) = args.url.as_deref() {
        let parsed = reqwest::Url::parse(raw).map_err(|e| format!("invalid --url '{raw}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("invalid --url '{raw}': expected http or https"));
        }
    }
    if let Some(raw) = args.history_index.as_deref() {
        reqwest::Url::parse(raw).map_err(|e| format!("invalid --history-index '{raw}': {e}"))?;
    }
    if let Some(raw) = args.output_format.as_deref() {
        crate::output::OutputFormat::parse(raw)?;
    }
    if let Some(raw) = args.classifier.as_deref() {
        if crate::runner::ClassifierKind::parse(raw).is_none() {
            return Err(format!("invalid --classifier '{raw}', expected keyword or none"));
        }
    }
    if let Some(ratio) = args.jaccard_threshold {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(format!("invalid --jaccard-threshold {ratio}, expected 0.0 to 1.0"));
        }
    }
    if let Some(ratio) = args.size_deviation {
        if ratio < 0.0 {
            return Err(format!("invalid --size-deviation {ratio}, expected non-negative"));
        }
    }
    if let Some(raw) = args.guess_prefixes.as_deref() {
        if crate::utils::parse_csv_list(raw).is_empty() {
            return Err("invalid --guess-prefixes, expected at least one prefix".to_string());
        }
    }
    Ok(())
}
