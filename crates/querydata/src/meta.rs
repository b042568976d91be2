//! Meta parameters: fields derived from native parameters.

use chrono::{Datelike, NaiveDateTime, Timelike};
use qd_common::{Field, QdError, QdResult};

use crate::GridSource;

/// The fixed set of derived parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaParameter {
    /// Solar elevation angle in degrees.
    ElevationAngle,
    /// Wind chill temperature from `Temperature` and `WindSpeedMS`.
    WindChill,
    /// `RoadTemperature - DewPoint`.
    DewDifference,
    /// `TotalCloudCover` in eighths.
    N,
    /// `MiddleAndLowCloudCover` in eighths.
    NN,
}

impl MetaParameter {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "MetaElevationAngle" => Some(MetaParameter::ElevationAngle),
            "MetaWindChill" => Some(MetaParameter::WindChill),
            "MetaDewDifference" => Some(MetaParameter::DewDifference),
            "MetaN" => Some(MetaParameter::N),
            "MetaNN" => Some(MetaParameter::NN),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetaParameter::ElevationAngle => "MetaElevationAngle",
            MetaParameter::WindChill => "MetaWindChill",
            MetaParameter::DewDifference => "MetaDewDifference",
            MetaParameter::N => "MetaN",
            MetaParameter::NN => "MetaNN",
        }
    }

    /// Native parameters the computation reads.
    pub fn inputs(&self) -> &'static [&'static str] {
        match self {
            MetaParameter::ElevationAngle => &[],
            MetaParameter::WindChill => &["Temperature", "WindSpeedMS"],
            MetaParameter::DewDifference => &["RoadTemperature", "DewPoint"],
            MetaParameter::N => &["TotalCloudCover"],
            MetaParameter::NN => &["MiddleAndLowCloudCover"],
        }
    }

    /// Compute the derived field at one level and time of a source.
    pub fn compute(
        &self,
        source: &dyn GridSource,
        level: usize,
        time_index: usize,
    ) -> QdResult<Field> {
        let native = |name: &str| -> QdResult<Field> {
            if !source.has_param(name) {
                return Err(QdError::UnusableParameter(format!(
                    "{} requires {}",
                    self.name(),
                    name
                )));
            }
            source.values(name, level, time_index)
        };

        match self {
            MetaParameter::ElevationAngle => {
                let time = source.times().get(time_index).copied().ok_or_else(|| {
                    QdError::UnusableParameter(format!("{} at time index {}", self.name(), time_index))
                })?;
                let grid = source.grid();
                let mut field = Field::filled(grid.nx, grid.ny, None);
                for j in 0..grid.ny {
                    for i in 0..grid.nx {
                        let (lon, lat) = grid.lon_lat(i, j);
                        field.set(i, j, Some(solar_elevation(lon, lat, &time) as f32));
                    }
                }
                Ok(field)
            }
            MetaParameter::WindChill => {
                let t2m = native("Temperature")?;
                let wspd = native("WindSpeedMS")?;
                t2m.zip_with(&wspd, |t, ws| match (t, ws) {
                    (Some(t), Some(ws)) => wind_chill(ws, t),
                    _ => None,
                })
            }
            MetaParameter::DewDifference => {
                let troad = native("RoadTemperature")?;
                let tdew = native("DewPoint")?;
                troad.zip_with(&tdew, |road, dew| Some(road? - dew?))
            }
            MetaParameter::N => Ok(native("TotalCloudCover")?.map(|v| v.map(eighths))),
            MetaParameter::NN => Ok(native("MiddleAndLowCloudCover")?.map(|v| v.map(eighths))),
        }
    }
}

/// Cloudiness in percent to eighths.
fn eighths(cloudiness: f32) -> f32 {
    (cloudiness / 100.0 * 8.0).round()
}

/// Wind chill temperature (C) for a wind speed in m/s and temperature in C.
pub fn wind_chill(wind_speed: f32, temperature: f32) -> Option<f32> {
    if wind_speed < 0.0 {
        return None;
    }
    let kmh = wind_speed * 3.6;
    let chill = if kmh < 5.0 {
        temperature + (-1.59 + 0.1345 * temperature) / 5.0 * kmh
    } else {
        let p = kmh.powf(0.16);
        13.12 + 0.6215 * temperature - 11.37 * p + 0.3965 * temperature * p
    };
    Some(chill)
}

/// Solar elevation angle in degrees at a location and UTC time.
pub fn solar_elevation(lon: f64, lat: f64, utc: &NaiveDateTime) -> f64 {
    use std::f64::consts::PI;

    let day = utc.ordinal() as f64;
    let hours = utc.hour() as f64 + utc.minute() as f64 / 60.0 + utc.second() as f64 / 3600.0;

    // Fractional year in radians
    let gamma = 2.0 * PI / 365.0 * (day - 1.0 + (hours - 12.0) / 24.0);

    let eqtime = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let true_solar_minutes = hours * 60.0 + eqtime + 4.0 * lon;
    let hour_angle = (true_solar_minutes / 4.0 - 180.0).to_radians();

    let lat = lat.to_radians();
    let cos_zenith = lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos();
    90.0 - cos_zenith.clamp(-1.0, 1.0).acos().to_degrees()
}
