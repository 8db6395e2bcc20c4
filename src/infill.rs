//! Spatial-lag infiller: two inverse-distance-weighted
//! nearest-neighbor passes plus the market-value-proxy assignment rule
//! between them. Run once, before the merge loop starts; the driver never
//! calls back into this module.

use crate::parcel::ParcelTable;
use crate::spatial_index::ParcelIndex;

/// Runs phase D-1 (built area), the proxy assignment rule, and phase D-2
/// (market-value proxy) in order. Idempotent: a parcel whose target field is
/// already set is never re-queried or re-written by either pass.
pub fn run(table: &mut ParcelTable, index: &ParcelIndex, k: usize) -> Result<(), crate::Error> {
    infill_built_area(table, index, k)?;
    assign_market_value_proxy(table);
    // Donor eligibility for pass 2 is frozen here, before pass 2 writes any
    // infilled proxy -- a parcel whose proxy pass 2 fills in must never
    // itself become a donor for another parcel in the same pass.
    let direct_donor: Vec<bool> = (0..table.len())
        .map(|idx| table.market_value_proxy(idx).is_some())
        .collect();
    infill_market_value_proxy(table, index, k, &direct_donor);
    Ok(())
}

fn inverse_distance_weighted_mean(
    table: &ParcelTable,
    index: &ParcelIndex,
    idx: usize,
    k: usize,
    donor_has_value: impl Fn(usize) -> bool,
    donor_value: impl Fn(usize) -> f64,
) -> Option<f64> {
    let origin = table.centroid(idx);
    let origin = [origin.x(), origin.y()];

    let donors = index.k_nearest(origin, k, |donor_key| {
        table
            .index_of(donor_key)
            .map(|donor_idx| donor_idx != idx && donor_has_value(donor_idx))
            .unwrap_or(false)
    });
    if donors.is_empty() {
        return None;
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for donor_key in donors {
        let donor_idx = table.index_of(donor_key).expect("donor key came from table");
        let donor_point = table.centroid(donor_idx);
        let d = ((donor_point.x() - origin[0]).powi(2) + (donor_point.y() - origin[1]).powi(2))
            .sqrt();
        // A donor at the exact same location as the target contributes its
        // value outright rather than dividing by zero.
        if d == 0.0 {
            return Some(donor_value(donor_idx));
        }
        let weight = 1.0 / d;
        weighted_sum += weight * donor_value(donor_idx);
        weight_total += weight;
    }
    Some(weighted_sum / weight_total)
}

/// Pass 1: fills `built_area_sqft` from up to `k` nearest parcels that
/// already have a known built area. A parcel with zero eligible donors is a
/// fatal input-validity error (it is dropped from the study, surfaced to the
/// caller as [`crate::Error::NoBuiltAreaDonors`]).
fn infill_built_area(
    table: &mut ParcelTable,
    index: &ParcelIndex,
    k: usize,
) -> Result<(), crate::Error> {
    let targets: Vec<usize> = (0..table.len())
        .filter(|&idx| table.built_area_sqft(idx).is_none())
        .collect();

    for idx in targets {
        let value = inverse_distance_weighted_mean(
            table,
            index,
            idx,
            k,
            |donor_idx| table.built_area_sqft(donor_idx).is_some(),
            |donor_idx| table.built_area_sqft(donor_idx).unwrap(),
        )
        .ok_or_else(|| crate::Error::NoBuiltAreaDonors(table.key_at(idx)))?;
        table.set_built_area_sqft(idx, value);
    }
    Ok(())
}

/// Algorithmic step 3: mean of sale and assessed value when both are known,
/// assessed value alone otherwise. Parcels with neither are left absent for
/// [`infill_market_value_proxy`] to resolve.
///
/// `assessed_value_sqft == 0.0` is treated as "no assessed value on file"
/// rather than a literal zero assessment -- the input schema declares the
/// column non-nullable, so a sentinel is the only way an upstream loader can
/// represent a genuinely missing assessment, and it is the only reading
/// under which the "parcels with neither" case can ever occur.
fn assign_market_value_proxy(table: &mut ParcelTable) {
    for idx in 0..table.len() {
        if table.market_value_proxy(idx).is_some() {
            continue;
        }
        let assessed = table.assessed_value(idx);
        let has_assessed = assessed > 0.0;
        let proxy = match (table.adj_sale_price(idx), has_assessed) {
            (Some(sale), true) => Some((sale + assessed) / 2.0),
            (Some(sale), false) => Some(sale),
            (None, true) => Some(assessed),
            (None, false) => None,
        };
        if let Some(proxy) = proxy {
            table.set_market_value_proxy(idx, proxy);
        }
    }
}

/// Pass 2: same k=3 inverse-distance scheme as pass 1, with donors
/// restricted to parcels whose proxy came from step 3 directly (this pass
/// never donates from an already-infilled proxy).
fn infill_market_value_proxy(
    table: &mut ParcelTable,
    index: &ParcelIndex,
    k: usize,
    direct_donor: &[bool],
) {
    let targets: Vec<usize> = (0..table.len())
        .filter(|&idx| table.market_value_proxy(idx).is_none())
        .collect();

    for idx in targets {
        if let Some(value) = inverse_distance_weighted_mean(
            table,
            index,
            idx,
            k,
            |donor_idx| direct_donor[donor_idx] && table.market_value_proxy(donor_idx).is_some(),
            |donor_idx| table.market_value_proxy(donor_idx).unwrap(),
        ) {
            table.set_market_value_proxy(idx, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parcel::{ParcelInput, ParcelKey};
    use crate::tile::TileKey;
    use float_cmp::approx_eq;
    use geo_types::polygon;

    fn tiny_square(x0: f64) -> geo_types::Polygon<f64> {
        polygon![
            (x: x0, y: 0.0),
            (x: x0 + 0.1, y: 0.0),
            (x: x0 + 0.1, y: 0.1),
            (x: x0, y: 0.1),
            (x: x0, y: 0.0),
        ]
    }

    fn build_index(table: &ParcelTable) -> ParcelIndex {
        ParcelIndex::build(table.keys().map(|k| {
            let idx = table.index_of(k).unwrap();
            let c = table.centroid(idx);
            (k, [c.x(), c.y()])
        }))
    }

    #[test]
    fn built_area_infill_matches_seed_scenario_six() {
        // target at origin; donors at distances 1, 2, 4 with built areas
        // 100, 200, 400 -> (100*1 + 200*0.5 + 400*0.25) / 1.75 ~= 171.43
        let rows = vec![
            ParcelInput {
                key: ParcelKey(0),
                land_area_sqft: 1000.0,
                built_area_sqft: None,
                adj_sale_price: None,
                assessed_value: 1.0,
                geometry: tiny_square(0.0),
            },
            ParcelInput {
                key: ParcelKey(1),
                land_area_sqft: 1000.0,
                built_area_sqft: Some(100.0),
                adj_sale_price: None,
                assessed_value: 1.0,
                geometry: tiny_square(1.0),
            },
            ParcelInput {
                key: ParcelKey(2),
                land_area_sqft: 1000.0,
                built_area_sqft: Some(200.0),
                adj_sale_price: None,
                assessed_value: 1.0,
                geometry: tiny_square(2.0),
            },
            ParcelInput {
                key: ParcelKey(3),
                land_area_sqft: 1000.0,
                built_area_sqft: Some(400.0),
                adj_sale_price: None,
                assessed_value: 1.0,
                geometry: tiny_square(4.0),
            },
        ];
        let mut table = ParcelTable::from_rows(rows, TileKey(0)).unwrap();
        let index = build_index(&table);
        infill_built_area(&mut table, &index, 3).unwrap();

        let idx0 = table.index_of(ParcelKey(0)).unwrap();
        let expected = (100.0 * 1.0 + 200.0 * 0.5 + 400.0 * 0.25) / 1.75;
        assert!(approx_eq!(
            f64,
            table.built_area_sqft(idx0).unwrap(),
            expected,
            epsilon = 1e-9
        ));
    }

    #[test]
    fn no_donors_is_an_error() {
        let rows = vec![ParcelInput {
            key: ParcelKey(0),
            land_area_sqft: 1000.0,
            built_area_sqft: None,
            adj_sale_price: None,
            assessed_value: 1.0,
            geometry: tiny_square(0.0),
        }];
        let mut table = ParcelTable::from_rows(rows, TileKey(0)).unwrap();
        let index = build_index(&table);
        let err = infill_built_area(&mut table, &index, 3).unwrap_err();
        assert!(matches!(err, crate::Error::NoBuiltAreaDonors(_)));
    }

    #[test]
    fn proxy_assignment_prefers_sale_and_assessed_mean() {
        let rows = vec![ParcelInput {
            key: ParcelKey(0),
            land_area_sqft: 1000.0,
            built_area_sqft: Some(100.0),
            adj_sale_price: Some(300_000.0),
            assessed_value: 100_000.0,
            geometry: tiny_square(0.0),
        }];
        let mut table = ParcelTable::from_rows(rows, TileKey(0)).unwrap();
        assign_market_value_proxy(&mut table);
        let idx = table.index_of(ParcelKey(0)).unwrap();
        assert!(approx_eq!(
            f64,
            table.market_value_proxy(idx).unwrap(),
            200_000.0,
            epsilon = 1e-9
        ));
    }

    #[test]
    fn infill_is_idempotent_on_complete_data() {
        let rows = vec![
            ParcelInput {
                key: ParcelKey(0),
                land_area_sqft: 1000.0,
                built_area_sqft: Some(100.0),
                adj_sale_price: Some(1.0),
                assessed_value: 1.0,
                geometry: tiny_square(0.0),
            },
            ParcelInput {
                key: ParcelKey(1),
                land_area_sqft: 1000.0,
                built_area_sqft: Some(200.0),
                adj_sale_price: None,
                assessed_value: 2.0,
                geometry: tiny_square(1.0),
            },
        ];
        let mut table = ParcelTable::from_rows(rows, TileKey(0)).unwrap();
        // Pre-populate the proxy to simulate "already complete" input data.
        for idx in 0..table.len() {
            table.set_market_value_proxy(idx, 42.0);
        }
        let index = build_index(&table);
        run(&mut table, &index, 3).unwrap();

        for idx in 0..table.len() {
            assert_eq!(table.market_value_proxy(idx), Some(42.0));
        }
        assert_eq!(table.built_area_sqft(0).unwrap(), 100.0);
        assert_eq!(table.built_area_sqft(1).unwrap(), 200.0);
    }
}
