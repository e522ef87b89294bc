//! INDI mount driver
//!
//! Talks INDI XML to an `indiserver` over a fresh TCP connection per polling
//! iteration. Commands are fire-and-forget property vectors; the position is
//! read back by requesting `EQUATORIAL_EOD_COORD` and parsing the reply.

use crate::driver::{MountGeometry, Reading, TelescopeDriver};
use crate::error::{TelescopeError, TelescopeResult};
use async_trait::async_trait;
use crac_core::{AltazCoords, EquatorialCoords, TelescopeConfig, TelescopeSpeed};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default INDI server port
pub const INDI_DEFAULT_PORT: u16 = 7624;

const EOD_COORD: &str = "EQUATORIAL_EOD_COORD";
const COORD_SET: &str = "ON_COORD_SET";
const TRACK_STATE: &str = "TELESCOPE_TRACK_STATE";
const PARK: &str = "TELESCOPE_PARK";

/// INDI property state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndiPropertyState {
    Idle,
    Ok,
    Busy,
    Alert,
}

impl IndiPropertyState {
    /// Mount speed implied by the state of the coordinate vector
    pub fn speed(state: Option<IndiPropertyState>) -> TelescopeSpeed {
        match state {
            Some(IndiPropertyState::Ok) => TelescopeSpeed::Tracking,
            Some(IndiPropertyState::Idle) => TelescopeSpeed::NotTracking,
            Some(IndiPropertyState::Busy) => TelescopeSpeed::Slewing,
            Some(IndiPropertyState::Alert) | None => TelescopeSpeed::Error,
        }
    }
}

struct IndiConnection {
    writer: OwnedWriteHalf,
    reader: Reader<BufReader<OwnedReadHalf>>,
}

pub struct IndiTelescope {
    host: String,
    port: u16,
    device: String,
    io_timeout: Duration,
    tracking_off: bool,
    geometry: MountGeometry,
    connection: Option<IndiConnection>,
}

impl IndiTelescope {
    pub fn new(config: &TelescopeConfig, geometry: MountGeometry) -> Self {
        Self {
            host: config.hostname.clone(),
            port: config.port.unwrap_or(INDI_DEFAULT_PORT),
            device: config.device_name.clone(),
            io_timeout: config.io_timeout(),
            tracking_off: config.tracking_off_capability,
            geometry,
            connection: None,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn send(&mut self, command: String) -> TelescopeResult<()> {
        let io_timeout = self.io_timeout;
        let conn = self.connection.as_mut().ok_or(TelescopeError::NotConnected)?;
        tracing::trace!("INDI >> {}", command);

        let write = async {
            conn.writer.write_all(command.as_bytes()).await?;
            conn.writer.flush().await
        };
        timeout(io_timeout, write)
            .await
            .map_err(|_| TelescopeError::Timeout {
                operation: "INDI command".to_string(),
                duration: io_timeout,
            })??;
        Ok(())
    }

    async fn set_switches(&mut self, property: &str, switches: &[(&str, bool)]) -> TelescopeResult<()> {
        let command = switch_vector(&self.device, property, switches);
        self.send(command).await
    }

    async fn set_target(&mut self, eq: EquatorialCoords) -> TelescopeResult<()> {
        let command = number_vector(&self.device, EOD_COORD, &[("DEC", eq.dec), ("RA", eq.ra)]);
        self.send(command).await
    }

    async fn slew_to(&mut self, aa: AltazCoords, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.set_switches(PARK, &[("UNPARK", true)]).await?;
        let target = self.geometry.target_now(aa);
        tracing::debug!("INDI slew to {:?} ({:?})", aa, target);
        self.set_speed(speed).await?;
        self.set_target(target).await?;
        self.set_switches(TRACK_STATE, &[("TRACK_OFF", true)]).await
    }
}

#[async_trait]
impl TelescopeDriver for IndiTelescope {
    fn name(&self) -> &str {
        "indi"
    }

    fn tracking_off_capability(&self) -> bool {
        self.tracking_off
    }

    async fn connect(&mut self) -> TelescopeResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let address = self.address();
        let stream = match timeout(self.io_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TelescopeError::ConnectionFailed {
                    address,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TelescopeError::ConnectionTimeout {
                    address,
                    duration: self.io_timeout,
                })
            }
        };

        let (read_half, write_half) = stream.into_split();
        let mut reader = Reader::from_reader(BufReader::new(read_half));
        reader.trim_text(true);
        self.connection = Some(IndiConnection {
            writer: write_half,
            reader,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> TelescopeResult<()> {
        if let Some(mut conn) = self.connection.take() {
            conn.writer.shutdown().await?;
        }
        Ok(())
    }

    async fn sync(&mut self) -> TelescopeResult<()> {
        let target = self.geometry.target_now(self.geometry.park);
        self.set_switches(COORD_SET, &[("SLEW", false), ("TRACK", false), ("SYNC", true)])
            .await?;
        self.set_target(target).await?;
        self.set_switches(COORD_SET, &[("SLEW", false), ("TRACK", true), ("SYNC", false)])
            .await
    }

    async fn set_speed(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        if speed == TelescopeSpeed::NotTracking {
            return self.set_switches(TRACK_STATE, &[("TRACK_OFF", true)]).await;
        }

        self.set_switches(TRACK_STATE, &[("TRACK_ON", true)]).await?;
        self.set_switches(
            COORD_SET,
            &[
                ("SLEW", speed == TelescopeSpeed::Slewing),
                ("TRACK", speed == TelescopeSpeed::Tracking),
                ("SYNC", false),
            ],
        )
        .await
    }

    async fn park(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.slew_to(self.geometry.park, speed).await
    }

    async fn flat(&mut self, speed: TelescopeSpeed) -> TelescopeResult<()> {
        self.slew_to(self.geometry.flat, speed).await
    }

    async fn retrieve(&mut self) -> TelescopeResult<Reading> {
        let request = format!(
            "<getProperties version=\"1.7\" device=\"{}\" name=\"{}\"/>",
            self.device, EOD_COORD
        );
        self.send(request).await?;

        let io_timeout = self.io_timeout;
        let device = self.device.clone();
        let conn = self.connection.as_mut().ok_or(TelescopeError::NotConnected)?;
        let vector = timeout(io_timeout, read_coordinate_vector(&mut conn.reader, &device))
            .await
            .map_err(|_| TelescopeError::Timeout {
                operation: EOD_COORD.to_string(),
                duration: io_timeout,
            })??;

        let eq = vector.coords()?.rounded(2);
        Ok(Reading {
            aa: self.geometry.altaz_now(eq),
            eq,
            speed: IndiPropertyState::speed(vector.state),
        })
    }
}

// ============================================================================
// XML helpers
// ============================================================================

fn switch_vector(device: &str, property: &str, switches: &[(&str, bool)]) -> String {
    let elements: String = switches
        .iter()
        .map(|(name, on)| {
            format!(
                "<oneSwitch name=\"{}\">{}</oneSwitch>",
                name,
                if *on { "On" } else { "Off" }
            )
        })
        .collect();
    format!(
        "<newSwitchVector device=\"{}\" name=\"{}\">{}</newSwitchVector>",
        device, property, elements
    )
}

fn number_vector(device: &str, property: &str, numbers: &[(&str, f64)]) -> String {
    let elements: String = numbers
        .iter()
        .map(|(name, value)| format!("<oneNumber name=\"{}\">{}</oneNumber>", name, value))
        .collect();
    format!(
        "<newNumberVector device=\"{}\" name=\"{}\">{}</newNumberVector>",
        device, property, elements
    )
}

fn get_attribute(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name.as_bytes())
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

fn parse_state(s: &str) -> Option<IndiPropertyState> {
    match s.trim() {
        "Idle" => Some(IndiPropertyState::Idle),
        "Ok" => Some(IndiPropertyState::Ok),
        "Busy" => Some(IndiPropertyState::Busy),
        "Alert" => Some(IndiPropertyState::Alert),
        _ => None,
    }
}

/// Parse an INDI number, either decimal or sexagesimal (`12:30:36`)
fn parse_number(text: &str) -> TelescopeResult<f64> {
    let text = text.trim();
    let invalid = || TelescopeError::Parse(format!("invalid INDI number '{}'", text));

    if !text.contains(':') {
        return text.parse().map_err(|_| invalid());
    }

    let negative = text.starts_with('-');
    let mut value = 0.0;
    for (i, part) in text.trim_start_matches(['-', '+']).split(':').enumerate() {
        let part: f64 = part.trim().parse().map_err(|_| invalid())?;
        value += part / 60f64.powi(i as i32);
    }
    Ok(if negative { -value } else { value })
}

#[derive(Debug, Default)]
struct CoordinateVector {
    state: Option<IndiPropertyState>,
    ra: Option<f64>,
    dec: Option<f64>,
}

impl CoordinateVector {
    fn coords(&self) -> TelescopeResult<EquatorialCoords> {
        match (self.ra, self.dec) {
            (Some(ra), Some(dec)) => Ok(EquatorialCoords::new(ra, dec)),
            _ => Err(TelescopeError::Protocol(format!(
                "{} without RA/DEC elements",
                EOD_COORD
            ))),
        }
    }
}

fn is_coordinate_vector(e: &BytesStart, device: &str) -> bool {
    let tag = e.name();
    tag.as_ref().ends_with(b"NumberVector")
        && get_attribute(e, "name").as_deref() == Some(EOD_COORD)
        && get_attribute(e, "device").as_deref() == Some(device)
}

/// Read events until a complete coordinate vector for `device` arrived
async fn read_coordinate_vector<R: AsyncBufRead + Unpin>(
    reader: &mut Reader<R>,
    device: &str,
) -> TelescopeResult<CoordinateVector> {
    let mut buf = Vec::new();
    let mut current: Option<CoordinateVector> = None;
    let mut element: Option<String> = None;

    loop {
        match reader.read_event_into_async(&mut buf).await? {
            Event::Start(e) => {
                if is_coordinate_vector(&e, device) {
                    current = Some(CoordinateVector {
                        state: get_attribute(&e, "state").as_deref().and_then(parse_state),
                        ..Default::default()
                    });
                } else if current.is_some() {
                    let tag = e.name();
                    if tag.as_ref() == b"defNumber" || tag.as_ref() == b"oneNumber" {
                        element = get_attribute(&e, "name");
                    }
                }
            }
            Event::Text(text) => {
                if let (Some(vector), Some(name)) = (current.as_mut(), element.as_deref()) {
                    let value = parse_number(&text.unescape()?)?;
                    match name {
                        "RA" => vector.ra = Some(value),
                        "DEC" => vector.dec = Some(value),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                let tag = e.name();
                if tag.as_ref().ends_with(b"NumberVector") {
                    if let Some(vector) = current.take() {
                        return Ok(vector);
                    }
                }
                element = None;
            }
            Event::Eof => {
                return Err(TelescopeError::Protocol(format!(
                    "connection closed before {} was received",
                    EOD_COORD
                )))
            }
            _ => {}
        }
        buf.clear();
    }
}
