//! OLS evaluator: R² of the two-regressor model
//! `market_value_proxy ~ intercept + built_area_sqft + land_area_sqft` over a
//! candidate merged region, gated on the region's count of actual sales.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::parcel::ParcelTable;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("design matrix has no rows")]
    EmptyRegion,
}

/// Counts member parcels with a non-absent `adj_sale_price`. Infilled
/// proxies never count toward this -- only an actual recorded sale does.
pub fn sales_count(table: &ParcelTable, parcel_indices: &[usize]) -> usize {
    parcel_indices
        .iter()
        .filter(|&&idx| table.adj_sale_price(idx).is_some())
        .count()
}

/// R² of the model over `parcel_indices`, after applying the sales-count
/// gate. Numeric policy: centered normal equations solved by Cholesky when
/// well-conditioned, falling back to an SVD pseudoinverse otherwise; a
/// constant response (`SStot == 0`) is `R² = 0` by convention, checked
/// before any solve is attempted.
pub fn r_squared(
    table: &ParcelTable,
    parcel_indices: &[usize],
    min_sales_for_ols: usize,
) -> Result<f64, Error> {
    if parcel_indices.is_empty() {
        return Err(Error::EmptyRegion);
    }
    if sales_count(table, parcel_indices) < min_sales_for_ols {
        return Ok(0.0);
    }

    let n = parcel_indices.len();
    let y: DVector<f64> = DVector::from_iterator(
        n,
        parcel_indices
            .iter()
            .map(|&idx| table.market_value_proxy(idx).unwrap_or(0.0)),
    );
    let y_mean = y.mean();
    let sstot: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    if sstot <= 0.0 {
        return Ok(0.0);
    }

    // Centered regressors: built_area_sqft, land_area_sqft. The intercept is
    // recovered implicitly (centered OLS passes through the mean of y).
    let built_mean: f64 = parcel_indices
        .iter()
        .map(|&idx| table.built_area_sqft(idx).unwrap_or(0.0))
        .sum::<f64>()
        / n as f64;
    let land_mean: f64 = parcel_indices
        .iter()
        .map(|&idx| table.land_area_sqft(idx))
        .sum::<f64>()
        / n as f64;

    let mut x = DMatrix::<f64>::zeros(n, 2);
    for (row, &idx) in parcel_indices.iter().enumerate() {
        x[(row, 0)] = table.built_area_sqft(idx).unwrap_or(0.0) - built_mean;
        x[(row, 1)] = table.land_area_sqft(idx) - land_mean;
    }
    let yc: DVector<f64> = y.map(|v| v - y_mean);

    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &yc;

    let beta = match solve_well_conditioned(&xtx, &xty) {
        Some(beta) => beta,
        None => solve_pseudoinverse(&xtx, &xty),
    };

    let fitted = &x * beta;
    let ssres: f64 = (0..n).map(|i| (yc[i] - fitted[i]).powi(2)).sum();

    Ok((1.0 - ssres / sstot).clamp(0.0, 1.0))
}

/// Condition-number threshold above which Cholesky is abandoned in favor of
/// the pseudoinverse fallback.
const CONDITION_NUMBER_THRESHOLD: f64 = 1e8;

fn solve_well_conditioned(xtx: &DMatrix<f64>, xty: &DVector<f64>) -> Option<DVector<f64>> {
    if condition_number_estimate(xtx) > CONDITION_NUMBER_THRESHOLD {
        return None;
    }
    Cholesky::new(xtx.clone()).map(|chol| chol.solve(xty))
}

/// Cheap 2x2-friendly condition number estimate: ratio of the largest to
/// smallest eigenvalue magnitude of the (symmetric) normal-equations matrix,
/// via its singular values -- exact for the two-regressor design this
/// evaluator always builds.
fn condition_number_estimate(xtx: &DMatrix<f64>) -> f64 {
    let svd = xtx.clone().svd(false, false);
    let singular_values = svd.singular_values;
    let max = singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let min = singular_values
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    if min <= 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

fn solve_pseudoinverse(xtx: &DMatrix<f64>, xty: &DVector<f64>) -> DVector<f64> {
    match xtx.clone().pseudo_inverse(1e-12) {
        Ok(pinv) => pinv * xty,
        Err(_) => DVector::zeros(xty.len()),
    }
}
