//! Cell bounds for one-dimensional coordinates, in the manner of
//! `cdo genlevelbounds`.

use serde::Serialize;
use tracing::{debug, info};

use crate::array::{DataArray, Dataset};

pub const BOUNDS_DIM: &str = "bnds";

pub const HORIZONTAL_COORDS: &[&str] = &["lat", "lon", "latitude", "longitude"];

pub const VERTICAL_COORDS: &[&str] = &[
    "plev", "lev", "level", "pressure", "depth", "plev19", "plev8", "plev7", "plev4", "plev3",
    "height", "alt", "altitude",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundsArray {
    pub name: String,
    pub dims: [String; 2],
    pub values: Vec<[f64; 2]>,
    pub long_name: String,
}

/// Lower and upper edge for every point.
///
/// Interior edges are midpoints between neighbours, so `bounds[i][1]` and
/// `bounds[i + 1][0]` are the same value. The outer edges are extrapolated
/// by the distance to the nearest midpoint. A single point gets a unit-wide
/// cell around it.
pub fn calculate_bounds_1d(values: &[f64]) -> Vec<[f64; 2]> {
    match values {
        [] => Vec::new(),
        [only] => vec![[only - 0.5, only + 0.5]],
        [first, second] => {
            let half = (second - first) / 2.0;
            vec![[first - half, first + half], [second - half, second + half]]
        }
        _ => {
            let midpoints: Vec<f64> = values
                .windows(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect();
            let last = values.len() - 1;
            let mut bounds = vec![[0.0; 2]; values.len()];
            for (i, mid) in midpoints.iter().enumerate() {
                bounds[i][1] = *mid;
                bounds[i + 1][0] = *mid;
            }
            bounds[0][0] = values[0] - (midpoints[0] - values[0]);
            bounds[last][1] = values[last] + (values[last] - midpoints[last - 1]);
            bounds
        }
    }
}

pub fn bounds_for(coord: &DataArray) -> BoundsArray {
    let label = coord.attr("long_name").unwrap_or(&coord.name);
    BoundsArray {
        name: format!("{}_bnds", coord.name),
        dims: [coord.name.clone(), BOUNDS_DIM.to_string()],
        values: calculate_bounds_1d(&coord.values),
        long_name: format!("{label} bounds"),
    }
}

/// Adds `<name>_bnds` for each listed coordinate present in `dataset` and
/// points the coordinate's `bounds` attribute at it. Existing bounds are kept.
pub fn add_bounds_from_coords(dataset: &mut Dataset, coord_names: &[&str]) -> Vec<String> {
    let mut added = Vec::new();
    for name in coord_names {
        let bounds_name = format!("{name}_bnds");
        if dataset.contains(&bounds_name) {
            debug!(bounds = %bounds_name, "bounds already exist, skipping");
            continue;
        }
        let Some(coord) = dataset.get_mut(name) else {
            continue;
        };
        info!(coordinate = %name, "calculating bounds");
        let bounds = bounds_for(coord);
        coord.set_attr("bounds", &bounds_name);
        dataset.bounds.insert(bounds_name.clone(), bounds);
        added.push(bounds_name);
    }
    added
}

pub fn add_vertical_bounds(dataset: &mut Dataset, coord_names: Option<&[&str]>) -> Vec<String> {
    add_bounds_from_coords(dataset, coord_names.unwrap_or(VERTICAL_COORDS))
}
