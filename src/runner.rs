use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use reqwest::Method;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::context;
use crate::detector::{
    self, differential, headers, injection, pii, Finding, KeywordClassifier, PassthroughClassifier,
    ProbeError, ResponseClass, ResponseClassifier, Severity, Soft404Filter,
};
use crate::discovery::{self, js};
use crate::flow::{self, FlowConfig};
use crate::frontier::{Frontier, FrontierError};
use crate::transport::{ProbeResponse, RequestOptions, Transport, TransportConfig, TransportError};
use crate::utils;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClassifierKind {
    #[default]
    Keyword,
    Passthrough,
}

impl ClassifierKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Some(ClassifierKind::Keyword),
            "none" | "passthrough" => Some(ClassifierKind::Passthrough),
            _ => None,
        }
    }

    fn build(&self) -> Box<dyn ResponseClassifier> {
        match self {
            ClassifierKind::Keyword => Box::new(KeywordClassifier),
            ClassifierKind::Passthrough => Box::new(PassthroughClassifier),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Options {
    pub target: String,
    pub rate: u32,
    pub workers: usize,
    pub timeout_seconds: u64,
    pub proxy: Option<String>,
    pub follow_redirects: bool,
    pub history_index: Option<String>,
    pub history_limit: usize,
    pub skip_history: bool,
    pub skip_flow: bool,
    pub skip_context: bool,
    pub skip_method_audit: bool,
    pub top_words: usize,
    pub guess_prefixes: Vec<String>,
    pub flow: FlowConfig,
    pub size_deviation: f64,
    pub fuzz_params: String,
    pub min_secret_entropy: f64,
    pub hamming_threshold: u32,
    pub jaccard_threshold: f64,
    pub circuit_threshold: u32,
    pub circuit_cooldown_seconds: u64,
    pub classifier: ClassifierKind,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            target: String::new(),
            rate: 20,
            workers: 10,
            timeout_seconds: 10,
            proxy: None,
            follow_redirects: true,
            history_index: Some(discovery::DEFAULT_HISTORY_INDEX.to_string()),
            history_limit: discovery::DEFAULT_HISTORY_LIMIT,
            skip_history: false,
            skip_flow: false,
            skip_context: false,
            skip_method_audit: false,
            top_words: context::DEFAULT_TOP_WORDS,
            guess_prefixes: vec!["/".to_string(), "/api/".to_string()],
            flow: FlowConfig::default(),
            size_deviation: differential::DEFAULT_SIZE_DEVIATION,
            fuzz_params: differential::DEFAULT_FUZZ_PARAMS.to_string(),
            min_secret_entropy: js::DEFAULT_MIN_SECRET_ENTROPY,
            hamming_threshold: detector::soft404::DEFAULT_HAMMING_THRESHOLD,
            jaccard_threshold: detector::soft404::DEFAULT_JACCARD_THRESHOLD,
            circuit_threshold: crate::transport::circuit::DEFAULT_FAILURE_THRESHOLD,
            circuit_cooldown_seconds: crate::transport::circuit::DEFAULT_COOLDOWN.as_secs(),
            classifier: ClassifierKind::Keyword,
        }
    }
}

impl Options {
    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            rate: self.rate,
            timeout: Duration::from_secs(self.timeout_seconds),
            proxy: self.proxy.clone(),
            follow_redirects: self.follow_redirects,
            circuit_threshold: self.circuit_threshold,
            circuit_cooldown: Duration::from_secs(self.circuit_cooldown_seconds),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target URL: {url}")]
    InvalidTarget { url: String },

    #[error("invalid option {name}: {message}")]
    InvalidOption { name: &'static str, message: String },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("task join failed: {source}")]
    TaskJoin {
        #[source]
        source: tokio::task::JoinError,
    },
}

impl From<FrontierError> for ScanError {
    fn from(err: FrontierError) -> Self {
        ScanError::Fatal(err.to_string())
    }
}

impl From<TransportError> for ScanError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Build { source } => ScanError::HttpClientBuild { source },
            TransportError::ProxySetup { proxy, source } => ScanError::ProxySetup { proxy, source },
            TransportError::InvalidRate { value } => ScanError::InvalidOption {
                name: "rate",
                message: format!("{value} is not a positive integer"),
            },
            other => ScanError::Fatal(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScanPhase {
    Idle,
    Calibrating,
    Seeding,
    Draining,
    Completed,
    Failed,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Calibrating => "calibrating",
            ScanPhase::Seeding => "seeding",
            ScanPhase::Draining => "draining",
            ScanPhase::Completed => "completed",
            ScanPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Completed | ScanPhase::Failed)
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ScanReport {
    pub target: String,
    pub phase: ScanPhase,
    pub elapsed_seconds: f64,
    pub urls_visited: usize,
    pub findings: Vec<Finding>,
    pub logs: Vec<String>,
}

impl ScanReport {
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity >= severity)
            .count()
    }
}

pub type LogHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type FindingHook = Arc<dyn Fn(&Finding) + Send + Sync>;

/// Callbacks fired as log lines and findings are recorded, in recording order.
#[derive(Clone, Default)]
pub struct ScanHooks {
    pub on_log: Option<LogHook>,
    pub on_finding: Option<FindingHook>,
}

impl ScanHooks {
    pub fn on_log(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_log = Some(Arc::new(hook));
        self
    }

    pub fn on_finding(mut self, hook: impl Fn(&Finding) + Send + Sync + 'static) -> Self {
        self.on_finding = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ScanHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanHooks")
            .field("on_log", &self.on_log.is_some())
            .field("on_finding", &self.on_finding.is_some())
            .finish()
    }
}

// hooks run under the accumulator lock so observers see the recording order
#[derive(Debug, Default)]
struct Reporter {
    findings: Mutex<Vec<Finding>>,
    logs: Mutex<Vec<String>>,
    hooks: ScanHooks,
}

impl Reporter {
    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hook) = self.hooks.on_log.as_ref() {
            hook(&message);
        }
        logs.push(message);
    }

    fn add(&self, finding: Finding) {
        let mut findings = self.findings.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hook) = self.hooks.on_finding.as_ref() {
            hook(&finding);
        }
        findings.push(finding);
    }

    fn extend(&self, findings: impl IntoIterator<Item = Finding>) {
        for f in findings {
            self.add(f);
        }
    }

    fn snapshot(&self) -> (Vec<Finding>, Vec<String>) {
        let findings = self
            .findings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let logs = self.logs.lock().unwrap_or_else(|e| e.into_inner()).clone();
        (findings, logs)
    }
}

/// State shared by every worker of one scan.
#[derive(Debug)]
struct ScanSession {
    options: Options,
    origin: String,
    transport: Transport,
    frontier: Frontier,
    soft404: Soft404Filter,
    classifier: Box<dyn ResponseClassifier>,
    reporter: Reporter,
}

#[derive(Debug)]
pub struct Scanner {
    session: ScanSession,
    phase: watch::Sender<ScanPhase>,
}

impl Scanner {
    pub fn new(options: Options) -> Result<Self, ScanError> {
        let origin = validate_target(&options.target)?;
        validate_options(&options)?;

        let transport = Transport::new(&options.transport_config())?;
        let soft404 = Soft404Filter::new(options.hamming_threshold, options.jaccard_threshold);
        let classifier = options.classifier.build();
        let (phase, _) = watch::channel(ScanPhase::Idle);

        Ok(Self {
            session: ScanSession {
                options,
                origin,
                transport,
                frontier: Frontier::new(),
                soft404,
                classifier,
                reporter: Reporter::default(),
            },
            phase,
        })
    }

    pub fn with_hooks(mut self, hooks: ScanHooks) -> Self {
        self.session.reporter.hooks = hooks;
        self
    }

    pub fn options(&self) -> &Options {
        &self.session.options
    }

    pub fn origin(&self) -> &str {
        &self.session.origin
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanPhase> {
        self.phase.subscribe()
    }

    /// Runs the scan to completion. A fatal error ends the scan early but is
    /// reported as a `Scan Error` finding rather than returned.
    pub async fn run(self) -> ScanReport {
        let started_at = Instant::now();
        let Scanner { session, phase } = self;
        let session = Arc::new(session);
        let target = session.options.target.clone();

        let final_phase = match drive(&session, &phase).await {
            Ok(()) => ScanPhase::Completed,
            Err(e) => {
                warn!("scan of {} failed: {}", target, e);
                session.reporter.log(format!("scan failed: {e}"));
                session.reporter.add(Finding::new(
                    "Scan Error",
                    target.as_str(),
                    Severity::Critical,
                    e.to_string(),
                ));
                ScanPhase::Failed
            }
        };
        set_phase(&session, &phase, final_phase);
        session.transport.close();

        let urls_visited = session.frontier.visited_count().unwrap_or(0);
        let (findings, logs) = session.reporter.snapshot();
        ScanReport {
            target,
            phase: final_phase,
            elapsed_seconds: started_at.elapsed().as_secs_f64(),
            urls_visited,
            findings,
            logs,
        }
    }
}

fn validate_target(target: &str) -> Result<String, ScanError> {
    let invalid = || ScanError::InvalidTarget {
        url: target.to_string(),
    };
    let parsed = reqwest::Url::parse(target.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }
    utils::origin_of(target.trim()).ok_or_else(invalid)
}

fn validate_options(options: &Options) -> Result<(), ScanError> {
    let invalid = |name: &'static str, message: String| ScanError::InvalidOption { name, message };
    if options.workers == 0 {
        return Err(invalid("workers", "expected at least one worker".to_string()));
    }
    if options.timeout_seconds == 0 {
        return Err(invalid("timeout", "expected a positive number of seconds".to_string()));
    }
    if !(0.0..=1.0).contains(&options.jaccard_threshold) {
        return Err(invalid(
            "jaccard_threshold",
            format!("{} is outside 0.0..=1.0", options.jaccard_threshold),
        ));
    }
    if options.size_deviation < 0.0 {
        return Err(invalid(
            "size_deviation",
            format!("{} must not be negative", options.size_deviation),
        ));
    }
    if let Some(index) = options.history_index.as_deref() {
        if reqwest::Url::parse(index).is_err() {
            return Err(invalid("history_index", format!("{index} is not a URL")));
        }
    }
    Ok(())
}

fn set_phase(session: &ScanSession, phase: &watch::Sender<ScanPhase>, next: ScanPhase) {
    phase.send_replace(next);
    session.reporter.log(format!("phase: {next}"));
}

async fn drive(session: &Arc<ScanSession>, phase: &watch::Sender<ScanPhase>) -> Result<(), ScanError> {
    set_phase(session, phase, ScanPhase::Calibrating);
    calibrate(session).await;

    set_phase(session, phase, ScanPhase::Seeding);
    seed(session).await?;

    set_phase(session, phase, ScanPhase::Draining);
    drain(session).await
}

async fn calibrate(session: &ScanSession) {
    let nonce = uuid::Uuid::new_v4();
    let probe = format!("{}/api/v1/{}", session.origin, nonce);
    match session.transport.get(&probe).await {
        Ok(resp) if resp.is_ok() => {
            session.soft404.calibrate(&resp.body);
            session
                .reporter
                .log(format!("soft-404 baseline learned from {probe} ({} bytes)", resp.size));
        }
        Ok(resp) => session.reporter.log(format!(
            "random path answered {}, soft-404 filtering disabled",
            resp.status
        )),
        Err(e) => session
            .reporter
            .log(format!("calibration failed ({e}), soft-404 filtering disabled")),
    }
}

async fn seed(session: &ScanSession) -> Result<(), ScanError> {
    let options = &session.options;
    let target = options.target.as_str();
    // the landing page is fetched here once and never handed to the workers
    session.frontier.mark_visited(target)?;

    let landing = match session.transport.get(target).await {
        Ok(landing) => Some(landing),
        Err(e) => {
            session.reporter.log(format!("landing page unreachable: {e}"));
            None
        }
    };
    match landing.as_ref() {
        Some(page) if page.is_ok() => {
            session
                .reporter
                .extend(headers::audit_security_headers(page, target));
            if !options.skip_context {
                let guesses = context::generate_wordlist(&page.body, options.top_words);
                let urls = context::guess_urls(&session.origin, &options.guess_prefixes, &guesses);
                let queued = session.frontier.extend(urls)?;
                session
                    .reporter
                    .log(format!("context engine queued {queued} guesses"));
            }
        }
        Some(page) => session
            .reporter
            .log(format!("landing page answered {}", page.status)),
        None => {}
    }

    if !options.skip_method_audit {
        audit_methods(session).await;
    }

    if !options.skip_history {
        if let Some(index) = options.history_index.as_deref() {
            match discovery::mine_history(&session.transport, target, index, options.history_limit)
                .await
            {
                Ok(urls) => {
                    let queued = session.frontier.extend(urls)?;
                    session
                        .reporter
                        .log(format!("history index queued {queued} URLs"));
                }
                Err(e) => session.reporter.log(format!("history mining skipped: {e}")),
            }
        }
    }

    if !options.skip_flow {
        if let Some(page) = landing.as_ref() {
            let outcome = flow::explore_from(&session.transport, target, page, &options.flow).await;
            session.reporter.log(format!(
                "flow explorer took {} transitions (reward {})",
                outcome.reached.len(),
                outcome.total_reward
            ));
            session.reporter.extend(outcome.findings);
            for (i, url) in outcome.reached.iter().enumerate() {
                if !session.frontier.mark_visited(url)? {
                    continue;
                }
                if let Some(resp) = outcome.pages.get(i) {
                    analyze(session, url, resp).await?;
                }
            }
        }
    }

    if let Some(page) = landing.as_ref() {
        analyze(session, target, page).await?;
    }

    session
        .frontier
        .extend(discovery::sensitive_path_urls(&session.origin))?;
    Ok(())
}

async fn audit_methods(session: &ScanSession) {
    let target = session.options.target.as_str();
    let probes = headers::UNSAFE_METHODS.iter().filter_map(|name| {
        let method = Method::from_bytes(name.as_bytes()).ok()?;
        Some(async move {
            let result = session
                .transport
                .request(method, target, RequestOptions::default())
                .await;
            (*name, result)
        })
    });

    // results come back in method order regardless of completion order
    for (name, result) in join_all(probes).await {
        match result {
            Ok(resp) => {
                if let Some(f) = headers::check_method_response(name, resp.status, target) {
                    session.reporter.add(f);
                }
            }
            Err(e) => debug!("{} probe failed: {}", name, e),
        }
    }
}

async fn drain(session: &Arc<ScanSession>) -> Result<(), ScanError> {
    let mut workers = JoinSet::new();
    for id in 0..session.options.workers {
        let session = Arc::clone(session);
        workers.spawn(async move { worker(session, id).await });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                workers.abort_all();
                return Err(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                workers.abort_all();
                return Err(ScanError::TaskJoin { source: e });
            }
        }
    }
    Ok(())
}

async fn worker(session: Arc<ScanSession>, id: usize) -> Result<(), ScanError> {
    while let Some(url) = session.frontier.next().await? {
        let outcome = process(&session, &url).await;
        session.frontier.task_done();
        outcome?;
    }
    debug!("worker {} finished", id);
    Ok(())
}

async fn process(session: &ScanSession, url: &str) -> Result<(), ScanError> {
    if !utils::in_scope(url, &session.origin) {
        debug!("out of scope: {}", url);
        return Ok(());
    }
    if !session.frontier.mark_visited(url)? {
        return Ok(());
    }

    match session.transport.get(url).await {
        Ok(resp) => analyze(session, url, &resp).await,
        Err(e) => {
            debug!("fetch failed: {}", e);
            Ok(())
        }
    }
}

/// Detector chain for one fetched, already-visited page.
async fn analyze(session: &ScanSession, url: &str, resp: &ProbeResponse) -> Result<(), ScanError> {
    if !resp.is_ok() {
        return Ok(());
    }
    if session.soft404.is_soft_404(&resp.body) {
        session.reporter.log(format!("Soft 404 discarded: {url}"));
        return Ok(());
    }

    // the class is informational; every page still gets the active probes
    let class = session.classifier.classify(&resp.body);
    if class == ResponseClass::WafBlock {
        session
            .reporter
            .log(format!("WAF block page suspected at {url}"));
    } else {
        debug!("{} classified as {:?}", url, class);
    }

    absorb(session, "pii", url, Ok(pii::scan(&resp.body, url)))?;
    absorb(
        session,
        "sensitive-path",
        url,
        Ok(discovery::sensitive_path_finding(url, resp.size)
            .into_iter()
            .collect()),
    )?;
    absorb(session, "mass-assignment", url, probe_mass_assignment(session, resp).await)?;
    absorb(session, "sql", url, probe_sql(session, url).await)?;
    absorb(session, "xss", url, probe_xss(session, url).await)?;
    absorb(session, "idor", url, probe_idor(session, url).await)?;

    if resp.is_script() {
        absorb(session, "js", url, mine_script(session, resp).await)?;
    }
    Ok(())
}

fn absorb(
    session: &ScanSession,
    step: &str,
    url: &str,
    result: Result<Vec<Finding>, ProbeError>,
) -> Result<(), ScanError> {
    match result {
        Ok(findings) => {
            session.reporter.extend(findings);
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(ScanError::Fatal(e.to_string())),
        Err(e) => {
            debug!("{} skipped for {}: {}", step, url, e);
            Ok(())
        }
    }
}

async fn probe_mass_assignment(
    session: &ScanSession,
    base: &ProbeResponse,
) -> Result<Vec<Finding>, ProbeError> {
    let Some(fuzzed_url) = differential::mass_assignment_url(&base.url, &session.options.fuzz_params)
    else {
        return Ok(Vec::new());
    };
    let fuzzed = session.transport.get(&fuzzed_url).await?;
    Ok(differential::check_mass_assignment(
        base,
        &fuzzed,
        &base.url,
        session.options.size_deviation,
    ))
}

async fn probe_sql(session: &ScanSession, url: &str) -> Result<Vec<Finding>, ProbeError> {
    let probe = utils::with_query_param(url, "id", injection::SQLI_PAYLOAD)
        .ok_or_else(|| ProbeError::parse("sql", format!("cannot add query to {url}")))?;
    let resp = session.transport.get(&probe).await?;
    Ok(injection::check_sql_errors(&resp.body, url, injection::SQLI_PAYLOAD))
}

async fn probe_xss(session: &ScanSession, url: &str) -> Result<Vec<Finding>, ProbeError> {
    let probe = utils::with_query_param(url, "q", injection::XSS_CANARY)
        .ok_or_else(|| ProbeError::parse("xss", format!("cannot add query to {url}")))?;
    let resp = session.transport.get(&probe).await?;
    Ok(injection::check_xss_reflection(&resp.body, url))
}

async fn probe_idor(session: &ScanSession, url: &str) -> Result<Vec<Finding>, ProbeError> {
    let mut findings = Vec::new();
    for (candidate, id) in differential::idor_candidates(url) {
        let resp = match session.transport.get(&candidate).await {
            Ok(resp) => resp,
            Err(e) if e.is_transient() => {
                debug!("idor probe {} failed: {}", candidate, e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if resp.is_ok() && !session.soft404.is_soft_404(&resp.body) {
            findings.push(differential::idor_finding(url, &candidate, id));
        }
    }
    Ok(findings)
}

async fn mine_script(session: &ScanSession, resp: &ProbeResponse) -> Result<Vec<Finding>, ProbeError> {
    let intel = js::inspect_script(resp, session.options.min_secret_entropy);
    let queued = session
        .frontier
        .extend(intel.endpoints)
        .map_err(ProbeError::from)?;
    if queued > 0 {
        session
            .reporter
            .log(format!("{} endpoints mined from {}", queued, resp.url));
    }

    let mut findings = intel.findings;
    if let Some(map_url) = intel.source_map {
        session
            .reporter
            .log(format!("Source map referenced: {map_url}"));
        match js::probe_source_map(&session.transport, &map_url).await {
            Ok(more) => findings.extend(more),
            Err(e) => debug!("source map {} skipped: {}", map_url, e),
        }
    }
    Ok(findings)
}
