//! S6 — top-p truncation keeps exactly the probability-ordered prefix that
//! reaches the threshold, and repeated sampling respects the renormalized
//! distribution over that prefix.

use doppler::sampler::{sample, SamplerOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

#[test]
fn top_p_restricts_draws_to_the_top_two_tokens_in_their_prior_ratio() {
    let logits = vec![0.5f32.ln(), 0.3f32.ln(), 0.15f32.ln(), 0.05f32.ln()];
    let options = SamplerOptions {
        temperature: 1.0,
        top_k: 40,
        top_p: 0.8,
        repetition_penalty: 1.0,
    };
    let mut rng = StdRng::seed_from_u64(7);

    let mut counts: HashMap<u32, u32> = HashMap::new();
    const SAMPLES: u32 = 20_000;
    for _ in 0..SAMPLES {
        let token = sample(&logits, &options, &[], &mut rng);
        *counts.entry(token).or_insert(0) += 1;
    }

    assert_eq!(counts.keys().cloned().collect::<std::collections::HashSet<_>>(), [0u32, 1u32].into_iter().collect());

    let count0 = *counts.get(&0).unwrap() as f64;
    let count1 = *counts.get(&1).unwrap() as f64;
    let ratio = count0 / count1;
    // The original probabilities 0.5 and 0.3 renormalize to a 5:3 ratio.
    assert!((ratio - 5.0 / 3.0).abs() < 0.15, "empirical ratio {ratio} drifted too far from 5:3");
}
