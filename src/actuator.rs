use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

use crate::cli::DriveOpts;
use crate::directive::{Intent, Setpoint, Speeds};
use crate::port::open_drive_port;

/// Locomotion service. Both calls are idempotent.
pub trait Actuator {
    /// Translational velocity in mm/s, negative = backward.
    fn set_linear_velocity(&mut self, mm_s: i32) -> Result<()>;
    /// Rotational velocity in deg/s, positive = counter-clockwise.
    fn set_angular_velocity(&mut self, deg_s: i32) -> Result<()>;
}

/// Send the setpoints of `intent` in order.
pub fn drive(actuator: &mut dyn Actuator, intent: Intent, speeds: Speeds) -> Result<()> {
    for sp in intent.setpoints(speeds) {
        match sp {
            Setpoint::Linear(v) => actuator.set_linear_velocity(v)?,
            Setpoint::Angular(v) => actuator.set_angular_velocity(v)?,
        }
    }
    Ok(())
}

/// Serial drive line when a device is given, log-only otherwise.
pub fn open(opts: &DriveOpts) -> Result<Box<dyn Actuator>> {
    match &opts.dev {
        Some(dev) => {
            let port = open_drive_port(dev, opts.baud)?;
            info!(dev = %dev, baud = opts.baud, "drive line open");
            Ok(Box::new(LineActuator::new(port)))
        }
        None => {
            info!("no drive device, actuation is logged only");
            Ok(Box::new(LogActuator))
        }
    }
}

#[derive(Debug)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn set_linear_velocity(&mut self, mm_s: i32) -> Result<()> {
        info!(mm_s, "set linear velocity");
        Ok(())
    }

    fn set_angular_velocity(&mut self, deg_s: i32) -> Result<()> {
        info!(deg_s, "set angular velocity");
        Ok(())
    }
}

/// CRLF-terminated `VEL <mm/s>` / `RVEL <deg/s>` lines to the base bridge.
pub struct LineActuator<W: Write> {
    out: W,
    line: Vec<u8>,
}

impl<W: Write> LineActuator<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: Vec::with_capacity(16),
        }
    }

    fn send(&mut self, verb: &str, value: i32) -> Result<()> {
        self.line.clear();
        write!(self.line, "{} {}\r\n", verb, value)?;
        self.out
            .write_all(&self.line)
            .with_context(|| format!("drive write {}", verb))?;
        self.out.flush().context("drive flush")
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Actuator for LineActuator<W> {
    fn set_linear_velocity(&mut self, mm_s: i32) -> Result<()> {
        self.send("VEL", mm_s)
    }

    fn set_angular_velocity(&mut self, deg_s: i32) -> Result<()> {
        self.send("RVEL", deg_s)
    }
}
