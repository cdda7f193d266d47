use rand::Rng;

/// Picks an index with probability proportional to its weight.
///
/// Weights that are not finite or not positive carry no mass. Returns `None`
/// when the total mass is zero.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let mass = |weight: f64| if weight.is_finite() && weight > 0.0 { weight } else { 0.0 };
    let total: f64 = weights.iter().copied().map(mass).sum();
    if total <= 0.0 {
        return None;
    }

    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last_with_mass = None;
    for (index, weight) in weights.iter().copied().enumerate() {
        let weight = mass(weight);
        if weight == 0.0 {
            continue;
        }
        cumulative += weight;
        last_with_mass = Some(index);
        if target < cumulative {
            return Some(index);
        }
    }

    // Floating point drift can leave target a hair above the final sum.
    last_with_mass
}

pub fn weighted_choice<'a, T, R: Rng + ?Sized>(
    items: &'a [T],
    weights: &[f64],
    rng: &mut R,
) -> Option<&'a T> {
    if items.len() != weights.len() {
        return None;
    }
    weighted_index(weights, rng).and_then(|index| items.get(index))
}

pub fn uniform_choice<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.random_range(0..items.len()))
}
