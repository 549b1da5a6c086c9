use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::actuator::{self, Actuator};
use crate::cli::{FailurePolicy, PollOpts};
use crate::client::SecureRequestClient;
use crate::directive::{Code, CommandState, Directive, Intent, Speeds, apply};
use crate::endpoint::Endpoint;
use crate::stats::PollStats;

pub fn run(opts: PollOpts) -> Result<()> {
    debug!(?opts, "poll");
    let policy = FailurePolicy::from_cli(&opts.on_error)?;
    let timeouts = opts.timeouts.timeouts();
    let tls = opts.tls.context(&timeouts).context("tls setup")?;
    let mut actuator = actuator::open(&opts.drive)?;

    let mut poller = Poller::new(
        SecureRequestClient::new(tls, timeouts),
        opts.endpoint.endpoint(),
        opts.endpoint.body.clone().into_bytes(),
        opts.endpoint.capacity,
        opts.drive.speeds(),
    );
    let interval = Duration::from_millis(opts.interval_ms);

    info!(
        endpoint = %poller.endpoint.authority(),
        path = %poller.endpoint.path,
        interval_ms = opts.interval_ms,
        ?policy,
        "starting poll loop"
    );

    loop {
        if let Err(e) = poller.cycle(&mut *actuator) {
            match policy {
                FailurePolicy::Continue => warn!("cycle failed: {:#}", e),
                FailurePolicy::Exit => {
                    error!("cycle failed, exiting: {:#}", e);
                    poller.stats.log();
                    return Err(e);
                }
            }
        }

        poller.stats.maybe_log(opts.stats);
        if let Some(max) = opts.cycles
            && poller.stats.cycles() >= max
        {
            poller.stats.log();
            return Ok(());
        }
        std::thread::sleep(interval);
    }
}

/// Per-process poll state: the client, what to send and the last applied
/// code.
pub struct Poller {
    client: SecureRequestClient,
    endpoint: Endpoint,
    body: Vec<u8>,
    capacity: usize,
    speeds: Speeds,
    state: CommandState,
    pub stats: PollStats,
}

impl Poller {
    pub fn new(
        client: SecureRequestClient,
        endpoint: Endpoint,
        body: Vec<u8>,
        capacity: usize,
        speeds: Speeds,
    ) -> Self {
        Self {
            client,
            endpoint,
            body,
            capacity,
            speeds,
            state: CommandState::default(),
            stats: PollStats::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// One exchange, decode and conditional actuation.
    pub fn cycle(&mut self, actuator: &mut dyn Actuator) -> Result<Option<Intent>> {
        let reply = match self.client.post(&self.endpoint, &self.body, self.capacity) {
            Ok(reply) => reply,
            Err(e) => {
                self.stats.inc_failed();
                return Err(e.into());
            }
        };
        self.stats.inc_ok();
        self.stats.add_bytes(reply.len());
        self.handle_reply(&reply, actuator)
    }

    /// Decode `reply` and drive the base if the code changed. The state only
    /// advances once the actuator took the setpoints.
    pub fn handle_reply(
        &mut self,
        reply: &[u8],
        actuator: &mut dyn Actuator,
    ) -> Result<Option<Intent>> {
        let directive = Directive::decode(reply);
        if directive.status_ok {
            debug!(body = %String::from_utf8_lossy(reply), "reply");
        } else {
            debug!(body = %String::from_utf8_lossy(reply), "reply without ok status, ignored");
        }

        let (effect, next) = apply(&directive, self.state);
        match effect {
            Some(intent) => {
                actuator::drive(actuator, intent, self.speeds)
                    .with_context(|| format!("actuating {}", intent))?;
                info!(%intent, "actuated");
                self.stats.inc_actuations();
            }
            None if directive.status_ok && directive.code == Code::Unknown => {
                self.stats.inc_unknown();
            }
            None if directive.status_ok => self.stats.inc_suppressed(),
            None => {}
        }
        self.state = next;
        Ok(effect)
    }
}
