//! Rendering area: a projection clipped to a geographic rectangle and
//! mapped onto an image of a given size.

use qd_common::{QdError, QdResult};

use crate::{LatLon, Mercator, Projection, Stereographic};

/// Default image size when a projection description omits it.
const DEFAULT_SIZE: f64 = 400.0;

/// Coordinate conversions consumed by the rendering pipeline.
///
/// Pixel coordinates have their origin in the top-left corner with y growing
/// downwards. World coordinates are projected metres with y growing north.
pub trait Area: Send + Sync {
    fn width(&self) -> f64;
    fn height(&self) -> f64;

    /// Geographic `(lon, lat)` to pixel `(x, y)`.
    fn to_xy(&self, lon: f64, lat: f64) -> (f64, f64);

    /// Pixel `(x, y)` to geographic `(lon, lat)`.
    fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64);

    fn lat_lon_to_world_xy(&self, lon: f64, lat: f64) -> (f64, f64);
    fn world_xy_to_lat_lon(&self, x: f64, y: f64) -> (f64, f64);

    fn bottom_left_lat_lon(&self) -> (f64, f64);
    fn top_right_lat_lon(&self) -> (f64, f64);

    /// Pixel size rounded the way output images are allocated.
    fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width() + 0.5).max(1.0) as u32,
            (self.height() + 0.5).max(1.0) as u32,
        )
    }
}

/// An [`Area`] backed by any [`Projection`].
#[derive(Debug)]
pub struct MapArea {
    projection: Box<dyn Projection>,
    bottom_left: (f64, f64),
    top_right: (f64, f64),
    /// World rectangle (x1, y1, x2, y2)
    world: (f64, f64, f64, f64),
    width: f64,
    height: f64,
}

impl MapArea {
    /// Create an area from its corner coordinates.
    ///
    /// A negative width or height is derived from the aspect ratio of the
    /// projected world rectangle; both cannot be negative.
    pub fn new(
        projection: Box<dyn Projection>,
        bottom_left: (f64, f64),
        top_right: (f64, f64),
        width: f64,
        height: f64,
    ) -> QdResult<Self> {
        let (x1, y1) = projection.forward(bottom_left.0, bottom_left.1);
        let (x2, y2) = projection.forward(top_right.0, top_right.1);

        let invalid = |message: &str| QdError::InvalidProjection {
            projection: projection.name().to_string(),
            message: message.to_string(),
        };

        if (x2 - x1).abs() < 1e-9 || (y2 - y1).abs() < 1e-9 {
            return Err(invalid("the area corners span an empty rectangle"));
        }

        let aspect = (x2 - x1).abs() / (y2 - y1).abs();
        let (width, height) = match (width < 0.0, height < 0.0) {
            (false, false) => (width, height),
            (false, true) => (width, width / aspect),
            (true, false) => (height * aspect, height),
            (true, true) => return Err(invalid("width and height cannot both be derived")),
        };

        if width < 1.0 || height < 1.0 {
            return Err(invalid("image size must be at least one pixel"));
        }

        tracing::debug!(
            projection = projection.name(),
            bottom_left = ?bottom_left,
            top_right = ?top_right,
            width,
            height,
            "Area created"
        );

        Ok(Self {
            projection,
            bottom_left,
            top_right,
            world: (x1, y1, x2, y2),
            width,
            height,
        })
    }

    pub fn projection(&self) -> &dyn Projection {
        self.projection.as_ref()
    }
}

impl Area for MapArea {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn to_xy(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (wx, wy) = self.projection.forward(lon, lat);
        let (x1, y1, x2, y2) = self.world;
        (
            (wx - x1) / (x2 - x1) * self.width,
            (y2 - wy) / (y2 - y1) * self.height,
        )
    }

    fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64) {
        let (x1, y1, x2, y2) = self.world;
        let wx = x1 + x / self.width * (x2 - x1);
        let wy = y2 - y / self.height * (y2 - y1);
        self.projection.inverse(wx, wy)
    }

    fn lat_lon_to_world_xy(&self, lon: f64, lat: f64) -> (f64, f64) {
        self.projection.forward(lon, lat)
    }

    fn world_xy_to_lat_lon(&self, x: f64, y: f64) -> (f64, f64) {
        self.projection.inverse(x, y)
    }

    fn bottom_left_lat_lon(&self) -> (f64, f64) {
        self.bottom_left
    }

    fn top_right_lat_lon(&self) -> (f64, f64) {
        self.top_right
    }
}

/// Parse a projection description.
///
/// Grammar: `<kind>[,<params>]:<lon1>,<lat1>,<lon2>,<lat2>[:<width>,<height>]`
///
/// Supported kinds:
/// - `latlon`
/// - `mercator`
/// - `stereographic[,<centrallon>,<centrallat>,<truelat>]` (defaults 0,90,60)
pub fn parse_area(description: &str) -> QdResult<MapArea> {
    let invalid = |message: String| QdError::InvalidProjection {
        projection: description.to_string(),
        message,
    };

    let parts: Vec<&str> = description.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(invalid("expected <kind>:<corners>[:<size>]".to_string()));
    }

    let numbers = |text: &str| -> QdResult<Vec<f64>> {
        text.split(',')
            .map(|s| {
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("'{}' is not a number", s)))
            })
            .collect()
    };

    let mut kind_parts = parts[0].split(',');
    let kind = kind_parts.next().unwrap_or("").trim();
    let param_text = kind_parts.collect::<Vec<_>>().join(",");
    let params = if param_text.trim().is_empty() {
        Vec::new()
    } else {
        numbers(&param_text)?
    };

    let projection: Box<dyn Projection> = match kind {
        "latlon" | "ylatlon" => Box::new(LatLon),
        "mercator" => Box::new(Mercator),
        "stereographic" => match params.as_slice() {
            [] => Box::new(Stereographic::new(0.0, 90.0, 60.0)),
            [lon] => Box::new(Stereographic::new(*lon, 90.0, 60.0)),
            [lon, lat] => Box::new(Stereographic::new(*lon, *lat, 60.0)),
            [lon, lat, true_lat] => Box::new(Stereographic::new(*lon, *lat, *true_lat)),
            _ => return Err(invalid("too many stereographic parameters".to_string())),
        },
        other => return Err(invalid(format!("unknown projection '{}'", other))),
    };

    let corners = numbers(parts[1])?;
    let [lon1, lat1, lon2, lat2] = corners.as_slice() else {
        return Err(invalid("expected four corner coordinates".to_string()));
    };

    let (width, height) = match parts.get(2) {
        None => (DEFAULT_SIZE, DEFAULT_SIZE),
        Some(size) => match numbers(size)?.as_slice() {
            [w, h] => (*w, *h),
            _ => return Err(invalid("expected <width>,<height>".to_string())),
        },
    };

    MapArea::new(projection, (*lon1, *lat1), (*lon2, *lat2), width, height)
}
