pub mod cli;
pub mod headless;

/// Initialize tracing/logging with the given directives
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the multi-threaded runtime the commands run on
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    use anyhow::Context;
    tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")
}
