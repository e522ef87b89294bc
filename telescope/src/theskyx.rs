//! TheSkyX mount driver
//!
//! Sends JavaScript snippets to the TheSkyX TCP scripting server. Each reply
//! carries the script output, a `|` separator and a status trailer ending in
//! `Error = <code>.`

use crate::driver::{MountGeometry, Reading, TelescopeDriver};
use crate::error::{TelescopeError, TelescopeResult};
use async_trait::async_trait;
use crac_core::{AltazCoords, TelescopeConfig, TelescopeSpeed};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

/// Default TheSkyX scripting port
pub const THESKYX_DEFAULT_PORT: u16 = 3040;

const GET_ALT_AZ: &str = r#"/* Java Script */
/* Socket Start Packet */
sky6RASCOMTele.Connect();
sky6RASCOMTele.GetAzAlt();
var Out = '{"az":' + sky6RASCOMTele.dAz + ',"alt":' + sky6RASCOMTele.dAlt +
    ',"tr":' + sky6RASCOMTele.IsTracking + ',"sl":' + sky6RASCOMTele.IsSlewComplete + '}';
/* Socket End Packet */"#;

const MOVE_TRACK: &str = r#"/* Java Script */
/* Socket Start Packet */
sky6RASCOMTele.Connect();
sky6RASCOMTele.Asynchronous = 1;
sky6RASCOMTele.SlewToAzAlt({az}, {alt}, "crac");
sky6RASCOMTele.SetTracking({track}, 1, 0, 0);
var Out = "slewing";
/* Socket End Packet */"#;

const SET_TRACKING: &str = r#"/* Java Script */
/* Socket Start Packet */
sky6RASCOMTele.Connect();
sky6RASCOMTele.SetTracking({track}, 1, 0, 0);
var Out = "tracking {track}";
/* Socket End Packet */"#;

const SYNC_TELE: &str = r#"/* Java Script */
/* Socket Start Packet */
sky6RASCOMTele.Connect();
sky6RASCOMTele.Sync({ra}, {dec}, "crac-park");
var Out = "synced";
/* Socket End Packet */"#;

#[derive(Debug, Deserialize)]
struct ScriptCoords {
    alt: f64,
    az: f64,
    tr: Value,
    sl: Value,
}

/// TheSkyX prints booleans as 0/1 or true/false depending on the property
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

static ERROR_CODE_RE: OnceLock<Regex> = OnceLock::new();

fn error_code_re() -> &'static Regex {
    ERROR_CODE_RE.get_or_init(|| Regex::new(r"Error = (\d+)\.").unwrap())
}

/// Device error code in a script reply, if non-zero
fn device_error(reply: &str) -> Option<u32> {
    error_code_re()
        .captures(reply)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|code| *code != 0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct TheSkyXTelescope {
    host: String,
    port: u16,
    io_timeout: Duration,
    tracking_off: bool,
    geometry: MountGeometry,
    stream: Option<TcpStream>,
}

impl TheSkyXTelescope {
    pub fn new(config: &TelescopeConfig, geometry: MountGeometry) -> Self {
        Self {
            host: config.hostname.clone(),
            port: config.port.unwrap_or(THESKYX_DEFAULT_PORT),
            io_timeout: config.io_timeout(),
            tracking_off: config.tracking_off_capability,
            geometry,
            stream: None,
        }
    }

    /// Run a script and return its output (the part before `|`)
    async fn call(&mut self, script: &str) -> TelescopeResult<String> {
        let io_timeout = self.io_timeout;
        let stream = self.stream.as_mut().ok_or(TelescopeError::NotConnected)?;
        tracing::trace!("TheSkyX >> {}", script);

        timeout(io_timeout, stream.write_all(script.as_bytes()))
            .await
            .map_err(|_| TelescopeError::Timeout {
                operation: "TheSkyX script".to_string(),
                duration: io_timeout,
            })??;

        let deadline = Instant::now() + io_timeout;
        let mut reply = String::new();
        let mut buf = [0u8; 1024];
        while !error_code_re().is_match(&reply) {
            let n = tokio::time::timeout_at(deadline, stream.read(&mut buf))
                .await
                .map_err(|_| TelescopeError::Timeout {
                    operation: "TheSkyX reply".to_string(),
                    duration: io_timeout,
                })??;
            if n == 0 {
                return Err(TelescopeError::Protocol(
                    "TheSkyX closed the connection mid-reply".to_string(),
                ));
            }
            reply.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        tracing::trace!("TheSkyX << {}", reply);

        if let Some(code) = device_error(&reply) {
            return Err(TelescopeError::Device(code));
        }
        let output = reply.split('|').next().unwrap_or_default();
        Ok(output.trim().to_string())
    }

    async fn slew_to(&mut self, aa: AltazCoords, speed: TelescopeSpeed) -> TelescopeResult<()> {
        let track = u8::from(speed == TelescopeSpeed::Tracking);
        let script = MOVE_TRACK
            .replace("{az}", &aa.az.to_string())
            .replace("{alt}", &aa.alt.to_string())
            .replace("{track}", &track.to_string());
        self.call(&script).await.map(|_| ())
    }
}

#[async_trait]
impl TelescopeDriver for TheSkyXTelescope {
    fn name(&self) -> &str {
        "theskyx"
    }

    fn tracking_off_capability(&self) -> bool {
        self.tracking_off
    }

    async fn connect(&mut self) -> TelescopeResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let address = format!("{}:{}", self.host, self.port);
        let stream = timeout(self.io_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TelescopeError::ConnectionTimeout {
                address: address.clone(),
                duration: self.io_timeout,
            })?
            .map_err(|e| TelescopeError::ConnectionFailed {
                address,
                message: e.to_string(),
            })?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> TelescopeResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    async fn sync(&mut self) -> TelescopeResult<()> {
        let target = self.geometry.target_now(self.geometry.park);
        let script = SYNC_TELE
            .replace("{ra}", &target.ra.to_string())
            .replace("{dec}", &target.dec.to_string());
        self.call(&script).await.map(|_| ())
    }

    async fn set_speed(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        let track = match speed {
            TelescopeSpeed::Tracking => 1,
            TelescopeSpeed::NotTracking => 0,
            // Slewing is a consequence of a goto, not a mode TheSkyX can be put in
            TelescopeSpeed::Slewing | TelescopeSpeed::Error => return Ok(()),
        };
        let script = SET_TRACKING.replace("{track}", &track.to_string());
        self.call(&script).await.map(|_| ())
    }

    async fn park(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.slew_to(self.geometry.park, speed).await
    }

    async fn flat(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.slew_to(self.geometry.flat, speed).await
    }

    async fn retrieve(&mut self) -> TelescopeResult<Reading> {
        let output = self.call(GET_ALT_AZ).await?;
        let coords: ScriptCoords = serde_json::from_str(&output)?;

        let aa = AltazCoords::new(round2(coords.alt), round2(coords.az));
        let speed = if !truthy(&coords.sl) {
            TelescopeSpeed::Slewing
        } else if truthy(&coords.tr) {
            TelescopeSpeed::Tracking
        } else {
            TelescopeSpeed::NotTracking
        };

        Ok(Reading {
            aa,
            eq: self.geometry.radec_now(aa),
            speed,
        })
    }
}
