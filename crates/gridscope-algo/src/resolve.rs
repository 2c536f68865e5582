//! Attach substation identity to clipped cells and assign transformers.
//!
//! Matching is strict: every clipped polygon must hold exactly one
//! substation point, and every substation may label at most one polygon.
//! Anything else is a [`GeometryError`] naming the polygon and the ids
//! involved.

use std::collections::{BTreeMap, HashMap};

use geo::{BoundingRect, Contains, Intersects, Rect};
use gridscope_core::{
    Diagnostics, GeometryError, QualityCategory, Substation, Territory, TerritoryId, Transformer,
    TransformerId,
};

use crate::clip::ClippedCell;

/// Label each clipped polygon with the substation it contains.
///
/// A point on a polygon's edge counts as inside. Territories come back
/// sorted by id.
pub fn resolve_territories(
    cells: &[ClippedCell],
    substations: &[Substation],
) -> Result<Vec<Territory>, GeometryError> {
    let mut owner: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut territories = Vec::with_capacity(cells.len());

    for cell in cells {
        let matches: Vec<usize> = substations
            .iter()
            .enumerate()
            .filter(|(_, s)| cell.geometry.intersects(&s.location))
            .map(|(i, _)| i)
            .collect();

        let substation = match matches.as_slice() {
            [] => return Err(GeometryError::UnmatchedTerritory { polygon: cell.index }),
            [only] => &substations[*only],
            many => {
                return Err(GeometryError::AmbiguousTerritory {
                    polygon: cell.index,
                    substations: many.iter().map(|&i| substations[i].id.to_string()).collect(),
                })
            }
        };
        owner.entry(matches[0]).or_default().push(cell.index);
        territories.push(Territory {
            id: substation.id.clone(),
            name: substation.name.clone(),
            geometry: cell.geometry.clone(),
        });
    }

    let mut split: Vec<(&usize, &Vec<usize>)> = owner.iter().filter(|(_, p)| p.len() > 1).collect();
    split.sort();
    if let Some((&substation, polygons)) = split.first() {
        return Err(GeometryError::SplitSubstation {
            substation: substations[substation].id.to_string(),
            polygons: polygons.to_vec(),
        });
    }

    territories.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(territories)
}

/// Transformer id → territory id for every transformer inside some territory.
pub type TransformerAssignment = BTreeMap<TransformerId, TerritoryId>;

/// Assign each transformer to the territory containing it.
///
/// A transformer exactly on a shared edge goes to the lowest territory id
/// and is counted; one outside every territory is excluded and counted.
pub fn assign_transformers(
    territories: &[Territory],
    transformers: &[Transformer],
    diagnostics: &mut Diagnostics,
) -> TransformerAssignment {
    let bounds: Vec<Option<Rect<f64>>> = territories.iter().map(|t| t.geometry.bounding_rect()).collect();
    let mut assignment = TransformerAssignment::new();

    for transformer in transformers {
        let point = transformer.location;
        let candidates: Vec<&Territory> = territories
            .iter()
            .zip(&bounds)
            .filter(|(_, rect)| rect.is_some_and(|r| r.intersects(&point)))
            .map(|(t, _)| t)
            .collect();

        let inside: Vec<&Territory> = candidates
            .iter()
            .copied()
            .filter(|t| t.geometry.contains(&point))
            .collect();
        let chosen = match inside.as_slice() {
            [only] => Some(*only),
            _ => {
                let mut touching: Vec<&Territory> = candidates
                    .iter()
                    .copied()
                    .filter(|t| t.geometry.intersects(&point))
                    .collect();
                touching.sort_by(|a, b| a.id.cmp(&b.id));
                if let Some(first) = touching.first() {
                    diagnostics.record(
                        QualityCategory::EdgeTiedTransformer,
                        transformer.id.as_str(),
                        &format!(
                            "on the edge of {} territories, assigned to {}",
                            touching.len(),
                            first.id
                        ),
                    );
                }
                touching.first().copied()
            }
        };

        match chosen {
            Some(territory) => {
                assignment.insert(transformer.id.clone(), territory.id.clone());
            }
            None => diagnostics.record(
                QualityCategory::OrphanedTransformer,
                transformer.id.as_str(),
                &format!("({:.1}, {:.1}) lies in no territory", point.x(), point.y()),
            ),
        }
    }

    assignment
}
