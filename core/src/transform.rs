//! Horizontal <-> equatorial coordinate transform
//!
//! Mean sidereal time and plain spherical trigonometry. Good to a small
//! fraction of a degree, which is all the curtain geometry and the mount
//! sync targets need. No precession is applied.

use crate::config::GeographyConfig;
use crate::types::{AltazCoords, EquatorialCoords};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Observatory location
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Latitude in degrees, north positive
    pub lat: f64,
    /// Longitude in degrees, east positive
    pub lon: f64,
}

impl From<&GeographyConfig> for Site {
    fn from(geo: &GeographyConfig) -> Self {
        Self {
            lat: geo.lat,
            lon: geo.lon,
        }
    }
}

/// Conversion between the mount frame and the sky frame at a given instant
pub trait CoordinateTransform: Send + Sync {
    fn altaz_to_radec(&self, aa: AltazCoords, time: DateTime<Utc>) -> EquatorialCoords;
    fn radec_to_altaz(&self, eq: EquatorialCoords, time: DateTime<Utc>) -> AltazCoords;
}

/// Transform for a fixed site using local mean sidereal time
#[derive(Debug, Clone)]
pub struct SiderealTransform {
    site: Site,
}

impl SiderealTransform {
    pub fn new(site: Site) -> Self {
        Self { site }
    }
}

impl CoordinateTransform for SiderealTransform {
    fn altaz_to_radec(&self, aa: AltazCoords, time: DateTime<Utc>) -> EquatorialCoords {
        let lat = self.site.lat.to_radians();
        let alt = aa.alt.to_radians();
        let az = aa.az.to_radians();

        let dec = (alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos())
            .clamp(-1.0, 1.0)
            .asin();
        // Hour angle, positive west of the meridian
        let ha = (-az.sin() * alt.cos()).atan2(alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos());

        let lst = local_sidereal_time(julian_day(&time), self.site.lon);
        let ra = (lst - ha.to_degrees() / 15.0).rem_euclid(24.0);

        EquatorialCoords::new(ra, dec.to_degrees())
    }

    fn radec_to_altaz(&self, eq: EquatorialCoords, time: DateTime<Utc>) -> AltazCoords {
        let lat = self.site.lat.to_radians();
        let dec = eq.dec.to_radians();

        let lst = local_sidereal_time(julian_day(&time), self.site.lon);
        let ha = ((lst - eq.ra) * 15.0).to_radians();

        let alt = (dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos())
            .clamp(-1.0, 1.0)
            .asin();
        let az = (-ha.sin() * dec.cos()).atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * ha.cos());

        AltazCoords::new(alt.to_degrees(), az.to_degrees().rem_euclid(360.0))
    }
}

/// Julian Day of a UTC instant
pub fn julian_day(dt: &DateTime<Utc>) -> f64 {
    let (y, m) = if dt.month() <= 2 {
        (dt.year() - 1, dt.month() + 12)
    } else {
        (dt.year(), dt.month())
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let day = (365.25 * (y as f64 + 4716.0)).floor()
        + (30.6001 * (m as f64 + 1.0)).floor()
        + dt.day() as f64
        + b as f64
        - 1524.5;

    let seconds = dt.num_seconds_from_midnight() as f64 + dt.nanosecond() as f64 / 1e9;
    day + seconds / 86_400.0
}

/// Local mean sidereal time in hours for a longitude in degrees (east positive)
pub fn local_sidereal_time(jd: f64, longitude: f64) -> f64 {
    let d = jd - 2_451_545.0;
    let t = d / 36_525.0;

    let gmst = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;

    (gmst + longitude).rem_euclid(360.0) / 15.0
}
