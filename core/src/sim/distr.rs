//! Sample random variates from the distributions the pipeline needs
//!
//! Both draws here are inverse-CDF constructions over a single uniform variate; the generic
//! distributions in `rand` do not cover them

// The effective population size "Ne" keeps its conventional capitalization here
#![allow(non_snake_case)]

use rand::Rng;

/// Draw an index from an unnormalized discrete distribution by walking the cumulative
/// weights until one exceeds a uniform variate
///
/// Returns the chosen index and its weight. Non-finite and non-positive weights carry no
/// mass; if rounding leaves the cumulative sum short of the variate, the draw lands on the
/// last bin with mass. `None` means no bin had mass at all
pub(super) fn sample_categorical<R, I>(weights: I, rng: &mut R) -> Option<(usize, f64)>
where
    R: Rng,
    I: IntoIterator<Item = f64>,
{
    let u: f64 = rng.gen();
    let mut cumulative = 0.0;
    let mut last_with_mass = None;
    for (index, weight) in weights.into_iter().enumerate() {
        if !(weight > 0.0) || !weight.is_finite() {
            continue;
        }
        cumulative += weight;
        last_with_mass = Some((index, weight));
        if cumulative > u {
            return last_with_mass;
        }
    }
    last_with_mass
}

/// Inverse-CDF draw of a single coalescence time on `(lower, upper]` for an interval entered
/// from above by `lineages` lineages, conditioned on exactly one coalescence inside it
///
/// Returns the time and its conditional density. The conditional law is exponential in the
/// distance below `upper` with rate `(lineages − 1)/Ne`, truncated at `lower`
pub(super) fn truncated_coalescent_time<R: Rng>(
    lineages: u32,
    lower: f64,
    upper: f64,
    Ne: f64,
    rng: &mut R,
) -> (f64, f64) {
    debug_assert!(lineages >= 2);
    debug_assert!(lower < upper);

    let rate = f64::from(lineages - 1) / Ne;
    // exp_m1/ln_1p keep precision when rate * (upper − lower) is tiny
    let z = -(rate * (lower - upper)).exp_m1() / rate;
    let u: f64 = rng.gen();
    let time = upper + (-rate * z * u).ln_1p() / rate;
    let density = (rate * (time - upper)).exp() / z;

    (time, density)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn categorical_draw_lands_in_support() {
        let mut rng = Pcg64::seed_from_u64(11);
        for _ in 0..1000 {
            let (index, weight) =
                sample_categorical([0.0, 0.2, 0.0, 0.5, 0.3].iter().copied(), &mut rng).unwrap();
            assert!(index == 1 || index == 3 || index == 4);
            assert!(weight > 0.0);
        }
    }

    #[test]
    fn categorical_draw_without_mass_is_none() {
        let mut rng = Pcg64::seed_from_u64(12);
        assert!(sample_categorical([0.0, 0.0], &mut rng).is_none());
        assert!(sample_categorical(std::iter::empty(), &mut rng).is_none());
    }

    #[test]
    fn categorical_draw_matches_weights() {
        let mut rng = Pcg64::seed_from_u64(13);
        let weights = [0.1, 0.6, 0.3];
        let mut counts = [0u32; 3];
        for _ in 0..30_000 {
            let (index, _) = sample_categorical(weights.iter().copied(), &mut rng).unwrap();
            counts[index] += 1;
        }
        for (count, weight) in counts.iter().zip(&weights) {
            assert!((f64::from(*count) / 30_000.0 - weight).abs() < 0.01);
        }
    }

    #[test]
    fn truncated_time_stays_inside_its_interval() {
        let mut rng = Pcg64::seed_from_u64(14);
        for _ in 0..1000 {
            let (time, density) = truncated_coalescent_time(4, 1.0, 2.5, 0.7, &mut rng);
            assert!(time > 1.0 && time <= 2.5);
            assert!(density > 0.0);
        }
    }

    #[test]
    fn truncated_time_density_integrates_to_one() {
        // Midpoint rule over the support; the density is smooth so 20k panels is plenty
        let (lineages, lower, upper, Ne) = (3u32, 0.0, 1.5, 0.8);
        let rate = f64::from(lineages - 1) / Ne;
        let z = (1.0 - (rate * (lower - upper)).exp()) / rate;
        let panels = 20_000;
        let width = (upper - lower) / f64::from(panels);
        let integral: f64 = (0..panels)
            .map(|i| {
                let t = lower + (f64::from(i) + 0.5) * width;
                (rate * (t - upper)).exp() / z * width
            })
            .sum();
        assert_relative_eq!(integral, 1.0, max_relative = 1e-6);
    }
}
