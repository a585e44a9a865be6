//! Geographic claim kinds and their binders.
//!
//! `GeoPoint` is the claim "the subject is at this coordinate". `GridCell` is
//! the narrower claim "the subject is somewhere inside this cell", derived
//! from a point proof without revealing the point.

use serde::{Deserialize, Serialize};

use crate::binder::ClaimBinder;
use crate::commitment::Commitment;
use crate::error::{ProofError, Result};

/// Finest supported grid resolution.
pub const MAX_GRID_RESOLUTION: u8 = 24;

const GEO_POINT_TAG: &[u8] = b"proofport/geo-point/v1";
const GRID_CELL_TAG: &[u8] = b"proofport/grid-cell/v1";

/// A WGS84 coordinate in degrees.
///
/// Only finite, in-range coordinates can be constructed, through
/// [`GeoPoint::new`] or deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoPointFields")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct GeoPointFields {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<GeoPointFields> for GeoPoint {
    type Error = ProofError;

    fn try_from(fields: GeoPointFields) -> Result<Self> {
        Self::new(fields.latitude, fields.longitude)
    }
}

impl GeoPoint {
    /// Rejects non-finite coordinates, latitudes outside `[-90, 90]` and
    /// longitudes outside `[-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(ProofError::InvalidClaim(format!(
                "Coordinates must be finite: ({}, {})",
                latitude, longitude
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ProofError::InvalidClaim(format!(
                "Latitude out of range: {}",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ProofError::InvalidClaim(format!(
                "Longitude out of range: {}",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

// -0.0 and 0.0 are the same coordinate but differ in bits.
fn canonical_bits(value: f64) -> [u8; 8] {
    let value = if value == 0.0 { 0.0 } else { value };
    value.to_bits().to_be_bytes()
}

/// Binder for [`GeoPoint`] claims.
pub struct GeoPointBinder;

impl ClaimBinder for GeoPointBinder {
    type Claim = GeoPoint;
    const KIND: &'static str = "geo-point";

    fn commit(claim: &GeoPoint) -> Commitment {
        Commitment::hash_tagged(
            GEO_POINT_TAG,
            &[
                &canonical_bits(claim.latitude),
                &canonical_bits(claim.longitude),
            ],
        )
    }
}

/// A cell of an equirectangular grid.
///
/// At resolution `r` the cell side is `180 / 2^r` degrees; rows count from
/// the south pole and columns from the antimeridian going east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub resolution: u8,
    pub row: u32,
    pub col: u32,
}

impl GridCell {
    /// Side length of a cell in degrees.
    pub fn side_degrees(resolution: u8) -> f64 {
        180.0 / f64::from(1u32 << resolution)
    }

    /// The cell at `resolution` that contains `point`.
    pub fn containing(point: &GeoPoint, resolution: u8) -> Result<Self> {
        if resolution > MAX_GRID_RESOLUTION {
            return Err(ProofError::InvalidClaim(format!(
                "Grid resolution {} exceeds maximum {}",
                resolution, MAX_GRID_RESOLUTION
            )));
        }

        let side = Self::side_degrees(resolution);
        let rows = 1u32 << resolution;
        let cols = rows * 2;
        // The north pole and the eastern antimeridian belong to the last cell.
        let row = (((point.latitude + 90.0) / side).floor() as u32).min(rows - 1);
        let col = (((point.longitude + 180.0) / side).floor() as u32).min(cols - 1);

        Ok(Self {
            resolution,
            row,
            col,
        })
    }

    /// `(south, west, north, east)` in degrees.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let side = Self::side_degrees(self.resolution);
        let south = -90.0 + f64::from(self.row) * side;
        let west = -180.0 + f64::from(self.col) * side;
        (south, west, south + side, west + side)
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        Self::containing(point, self.resolution)
            .map(|cell| cell == *self)
            .unwrap_or(false)
    }
}

/// Binder for [`GridCell`] claims.
pub struct GridCellBinder;

impl ClaimBinder for GridCellBinder {
    type Claim = GridCell;
    const KIND: &'static str = "grid-cell";

    fn commit(claim: &GridCell) -> Commitment {
        Commitment::hash_tagged(
            GRID_CELL_TAG,
            &[
                &[claim.resolution],
                &claim.row.to_be_bytes(),
                &claim.col.to_be_bytes(),
            ],
        )
    }
}
