use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "probewright",
    version,
    about = "web reconnaissance and vulnerability probing engine",
    long_about = "Probewright crawls a single origin, seeds its frontier from the landing page vocabulary, historical captures, JavaScript bundles and a greedy flow explorer, then runs a detector chain (PII, SQL errors, reflected XSS, mass assignment, IDOR, exposed secrets) against every reachable page.\n\nExamples:\n  probewright -u https://target.tld/\n  probewright -u https://target.tld/ -r 10 -w 4 --timeout 15\n  probewright -u https://target.tld/ -o findings.json --skip-history\n  probewright --init-config\n\nTip: Use --config to persist scan settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v info, -vv debug)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help_heading = "Output",
        help = "Only print the final summary."
    )]
    pub quiet: bool,

    #[arg(
        long = "no-color",
        visible_alias = "nc",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write the report to a file (format inferred from extension unless --output-format is set)."
    )]
    pub output: Option<String>,

    #[arg(
        long = "output-format",
        visible_alias = "of",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Report format: text or json."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'u',
        long = "url",
        visible_alias = "target",
        value_name = "URL",
        help_heading = "Input",
        help = "Target URL; every request stays on its origin."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        visible_alias = "cfg",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.probewright/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "init-config",
        help_heading = "Input",
        help = "Write a commented default config file and exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'r',
        long = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit (requests per second, shared by all workers)."
    )]
    pub rate: Option<u32>,

    #[arg(
        short = 'w',
        long = "workers",
        visible_alias = "concurrency",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of concurrent workers draining the frontier."
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Performance",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'x',
        long = "proxy",
        value_name = "URL",
        help_heading = "Performance",
        help = "Route all requests through this proxy."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "follow-redirects",
        visible_alias = "fr",
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL",
        help_heading = "Performance",
        help = "Follow HTTP redirects (default true)."
    )]
    pub follow_redirects: Option<bool>,

    #[arg(
        long = "circuit-threshold",
        value_name = "N",
        help_heading = "Performance",
        help = "Consecutive 5xx responses tolerated before the circuit opens."
    )]
    pub circuit_threshold: Option<u32>,

    #[arg(
        long = "circuit-cooldown",
        value_name = "SECONDS",
        help_heading = "Performance",
        help = "Seconds the circuit stays open before one probe is admitted."
    )]
    pub circuit_cooldown: Option<u64>,

    #[arg(
        long = "history-index",
        value_name = "URL",
        help_heading = "Discovery",
        help = "Historical capture index to query (CDX-style JSON)."
    )]
    pub history_index: Option<String>,

    #[arg(
        long = "history-limit",
        value_name = "N",
        help_heading = "Discovery",
        help = "Maximum number of historical captures to request."
    )]
    pub history_limit: Option<usize>,

    #[arg(
        long = "skip-history",
        help_heading = "Discovery",
        help = "Do not query the historical capture index."
    )]
    pub skip_history: bool,

    #[arg(
        long = "skip-context",
        help_heading = "Discovery",
        help = "Do not derive endpoint guesses from the landing page."
    )]
    pub skip_context: bool,

    #[arg(
        long = "skip-flow",
        help_heading = "Discovery",
        help = "Do not run the flow explorer."
    )]
    pub skip_flow: bool,

    #[arg(
        long = "top-words",
        value_name = "N",
        help_heading = "Discovery",
        help = "Landing-page words expanded into endpoint guesses."
    )]
    pub top_words: Option<usize>,

    #[arg(
        long = "guess-prefixes",
        value_name = "LIST",
        help_heading = "Discovery",
        help = "Comma-separated path prefixes guesses are placed under (default /,/api/)."
    )]
    pub guess_prefixes: Option<String>,

    #[arg(
        long = "flow-steps",
        value_name = "N",
        help_heading = "Discovery",
        help = "Maximum transitions taken by the flow explorer."
    )]
    pub flow_steps: Option<usize>,

    #[arg(
        long = "skip-method-audit",
        help_heading = "Detection",
        help = "Do not probe OPTIONS/PUT/DELETE/TRACE on the landing page."
    )]
    pub skip_method_audit: bool,

    #[arg(
        long = "classifier",
        value_name = "KIND",
        help_heading = "Detection",
        help = "Response classifier: keyword or none."
    )]
    pub classifier: Option<String>,

    #[arg(
        long = "fuzz-params",
        value_name = "QUERY",
        help_heading = "Detection",
        help = "Privileged parameters appended by the mass-assignment probe."
    )]
    pub fuzz_params: Option<String>,

    #[arg(
        long = "size-deviation",
        value_name = "RATIO",
        help_heading = "Detection",
        help = "Relative size change that counts as a mass-assignment signal (default 0.05)."
    )]
    pub size_deviation: Option<f64>,

    #[arg(
        long = "min-secret-entropy",
        value_name = "BITS",
        help_heading = "Detection",
        help = "Minimum Shannon entropy for a secret-shaped literal to be reported."
    )]
    pub min_secret_entropy: Option<f64>,

    #[arg(
        long = "hamming-threshold",
        value_name = "BITS",
        help_heading = "Detection",
        help = "SimHash distance below which a page matches the soft-404 baseline."
    )]
    pub hamming_threshold: Option<u32>,

    #[arg(
        long = "jaccard-threshold",
        value_name = "RATIO",
        help_heading = "Detection",
        help = "Token similarity above which a page matches the soft-404 baseline."
    )]
    pub jaccard_threshold: Option<f64>,
}
