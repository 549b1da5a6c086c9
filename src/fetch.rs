use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

use crate::cli::FetchOpts;
use crate::client::SecureRequestClient;
use crate::directive::Directive;

pub fn run(opts: FetchOpts) -> Result<()> {
    let timeouts = opts.timeouts.timeouts();
    let tls = opts.tls.context(&timeouts).context("tls setup")?;
    let client = SecureRequestClient::new(tls, timeouts);
    let endpoint = opts.endpoint.endpoint();

    let reply = client
        .post(&endpoint, opts.endpoint.body.as_bytes(), opts.endpoint.capacity)
        .with_context(|| format!("POST {} to {}", endpoint.path, endpoint.authority()))?;

    let directive = Directive::decode(&reply);
    info!(
        bytes = reply.len(),
        status_ok = directive.status_ok,
        code = ?directive.code,
        intent = ?directive.code.intent(),
        "fetched"
    );

    let mut out = std::io::stdout().lock();
    out.write_all(&reply).context("stdout")?;
    out.write_all(b"\n").context("stdout")?;
    Ok(())
}
