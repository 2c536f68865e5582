//! GeoJSON reading and writing for boundaries and territories.
//!
//! Only the areal subset is supported: `Polygon`, `MultiPolygon` and
//! `GeometryCollection`s of those, wrapped in a `Feature`, a
//! `FeatureCollection` or bare. Coordinates are `[lon, lat]`.

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use gridscope_core::{Territory, TerritoryId};
use serde_json::{json, Map, Value};

/// Pick the boundary of `place` out of a GeoJSON document.
///
/// A feature whose `name` (or `display_name`) property equals the place,
/// ignoring case, wins; otherwise the first areal feature. `Ok(None)` when
/// the document holds no areal geometry.
pub fn select_boundary(document: &Value, place: &str) -> Result<Option<MultiPolygon<f64>>> {
    let features: Vec<&Value> = match kind(document)? {
        "FeatureCollection" => document["features"]
            .as_array()
            .context("FeatureCollection without a `features` array")?
            .iter()
            .collect(),
        "Feature" => vec![document],
        _ => return parse_geometry(document),
    };

    let named = features.iter().find(|feature| {
        let props = &feature["properties"];
        ["name", "display_name"].iter().any(|key| {
            props[key]
                .as_str()
                .is_some_and(|name| name.trim().eq_ignore_ascii_case(place.trim()))
        })
    });
    if let Some(feature) = named {
        if let Some(geometry) = parse_geometry(&feature["geometry"])? {
            return Ok(Some(geometry));
        }
    }
    for feature in features {
        if let Some(geometry) = parse_geometry(&feature["geometry"])? {
            return Ok(Some(geometry));
        }
    }
    Ok(None)
}

/// Areal geometry of a GeoJSON geometry object; `Ok(None)` for points,
/// lines and null geometries.
pub fn parse_geometry(geometry: &Value) -> Result<Option<MultiPolygon<f64>>> {
    if geometry.is_null() {
        return Ok(None);
    }
    let polygons = match kind(geometry)? {
        "Polygon" => vec![polygon(&geometry["coordinates"])?],
        "MultiPolygon" => geometry["coordinates"]
            .as_array()
            .context("MultiPolygon without coordinates")?
            .iter()
            .map(polygon)
            .collect::<Result<Vec<_>>>()?,
        "GeometryCollection" => {
            let mut polygons = Vec::new();
            for member in geometry["geometries"].as_array().into_iter().flatten() {
                if let Some(mp) = parse_geometry(member)? {
                    polygons.extend(mp.0);
                }
            }
            polygons
        }
        _ => return Ok(None),
    };
    Ok((!polygons.is_empty()).then(|| MultiPolygon::new(polygons)))
}

fn kind(value: &Value) -> Result<&str> {
    value["type"]
        .as_str()
        .ok_or_else(|| anyhow!("GeoJSON object without a `type`"))
}

fn polygon(rings: &Value) -> Result<Polygon<f64>> {
    let mut rings = rings
        .as_array()
        .context("polygon coordinates must be an array of rings")?
        .iter()
        .map(ring);
    let exterior = rings.next().context("polygon without an exterior ring")??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring(value: &Value) -> Result<LineString<f64>> {
    let coords = value
        .as_array()
        .context("ring must be an array of positions")?
        .iter()
        .map(|position| {
            let x = position[0].as_f64();
            let y = position[1].as_f64();
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => bail!("invalid position {}", position),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    if coords.len() < 3 {
        bail!("ring with {} positions", coords.len());
    }
    Ok(LineString::from(coords))
}

/// GeoJSON geometry object for a multipolygon.
pub fn geometry_to_value(geometry: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<Value> = geometry
        .iter()
        .map(|polygon| {
            let rings: Vec<Value> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| Value::from(ring.coords().map(|c| json!([c.x, c.y])).collect::<Vec<_>>()))
                .collect();
            Value::from(rings)
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}

/// Territories as a `FeatureCollection` with `id` and `name` properties,
/// plus any `extra` properties keyed by territory id.
pub fn territories_to_value(
    territories: &[Territory],
    mut extra: impl FnMut(&Territory) -> Map<String, Value>,
) -> Value {
    let features: Vec<Value> = territories
        .iter()
        .map(|territory| {
            let mut properties = Map::new();
            properties.insert("id".into(), Value::from(territory.id.as_str()));
            properties.insert("name".into(), Value::from(territory.name.as_str()));
            properties.extend(extra(territory));
            json!({
                "type": "Feature",
                "id": territory.id.as_str(),
                "properties": properties,
                "geometry": geometry_to_value(&territory.geometry),
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// Read territories back from a `FeatureCollection` written by
/// [`territories_to_value`].
pub fn territories_from_value(document: &Value) -> Result<Vec<Territory>> {
    let features = document["features"]
        .as_array()
        .context("territory collection without `features`")?;
    features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let props = &feature["properties"];
            let id = props["id"]
                .as_str()
                .with_context(|| format!("feature #{i} has no `id` property"))?;
            let geometry = parse_geometry(&feature["geometry"])
                .with_context(|| format!("territory '{id}'"))?
                .unwrap_or_else(|| MultiPolygon::new(vec![]));
            Ok(Territory {
                id: TerritoryId::new(id),
                name: props["name"].as_str().unwrap_or_default().to_string(),
                geometry,
            })
        })
        .collect()
}
