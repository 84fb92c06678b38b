//! Closed-form transition kernel for the constant-size Kingman coalescent
//!
//! Both entry points share one summation walk over the partial-fractions expansion of the
//! lineage-count transition probability

// The effective population size "Ne" keeps its conventional capitalization here, which does
// not match the normal Rust snake-case guidelines
#![allow(non_snake_case)]

/// Pairwise coalescence weight `j(j−1)/2` for `j` lineages
pub(super) fn pair_rate(j: u32) -> f64 {
    let j = f64::from(j);
    j * (j - 1.0) / 2.0
}

/// Probability that a coalescent with effective size `Ne`, starting from `n_start` lineages,
/// holds exactly `n_end` lineages after time `elapsed`
///
/// Out-of-domain inputs (`n_start = 0`, `n_end = 0`, `n_start < n_end`, negative `elapsed`,
/// non-positive `Ne`) return 0; the identity case `n_start = n_end = 1` returns 1
pub fn transition_probability(n_start: u32, n_end: u32, elapsed: f64, Ne: f64) -> f64 {
    match summed_terms(n_start, n_end, elapsed, Ne) {
        Some(terms) => terms.sum,
        None => 0.0,
    }
}

/// Ratio of the kernel sum to its largest-magnitude term
///
/// A cheap cancellation diagnostic: values near 1 mean the sum is numerically trustworthy,
/// values near 0 mean the terms annihilate each other and the sum has lost its significant
/// digits. Out-of-domain inputs return 0 so ill-posed intervals read as fully cancelled
pub fn significance_loss(n_start: u32, n_end: u32, elapsed: f64, Ne: f64) -> f64 {
    match summed_terms(n_start, n_end, elapsed, Ne) {
        Some(terms) if terms.max_abs > 0.0 => terms.sum / terms.max_abs,
        Some(_) => 1.0,
        None => 0.0,
    }
}

/// Kernel sum together with the magnitude of its largest term
struct TermSum {
    sum: f64,
    max_abs: f64,
}

/// Walk the partial-fractions expansion, accumulating the sum and the largest |term|
///
/// The absorbing case `n_end = 1` runs its index from `k = 2`: the `k = 1` pole is avoided
/// by weighting each term with the mass already absorbed rather than with a decay ratio.
/// The two branches must not be merged
fn summed_terms(n_start: u32, n_end: u32, elapsed: f64, Ne: f64) -> Option<TermSum> {
    if n_start == 0 || n_end == 0 || n_start < n_end || elapsed < 0.0 || Ne <= 0.0 {
        return None;
    }
    if n_start == 1 && n_end == 1 {
        return Some(TermSum {
            sum: 1.0,
            max_abs: 1.0,
        });
    }

    let mut sum = 0.0;
    let mut max_abs = 0.0_f64;
    if n_end == 1 {
        for k in 2..=n_start {
            let weight = 1.0 - (-pair_rate(k) * elapsed / Ne).exp();
            let term = weight * partial_fraction(2, n_start, k);
            sum += term;
            max_abs = max_abs.max(term.abs());
        }
    } else {
        for k in n_end..=n_start {
            let weight = pair_rate(k) / pair_rate(n_end) * (-pair_rate(k) * elapsed / Ne).exp();
            let term = weight * partial_fraction(n_end, n_start, k);
            sum += term;
            max_abs = max_abs.max(term.abs());
        }
    }

    Some(TermSum { sum, max_abs })
}

/// Product over `l` in `lo..=hi`, `l ≠ k`, of `λ_l / (λ_l − λ_k)`
fn partial_fraction(lo: u32, hi: u32, k: u32) -> f64 {
    let rate_k = pair_rate(k);
    let mut product = 1.0;
    for l in lo..=hi {
        if l == k {
            continue;
        }
        let rate_l = pair_rate(l);
        product *= rate_l / (rate_l - rate_k);
    }
    product
}
