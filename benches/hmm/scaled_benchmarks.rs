use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hidden_markov::hmm::{
    baum_welch_step, EstimationConfig, MarkovModelBuilder, ScaledDp, TrainingSequence,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn bench_expected_counts(c: &mut Criterion) {
    let mut builder = MarkovModelBuilder::new(0..4usize, 0..6u8).unwrap();
    builder.allow_all_transitions();
    builder.set_random_probabilities_seeded(5);
    let model = builder.build().unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let mut group = c.benchmark_group("expected_counts");
    for &len in &[100usize, 1_000, 10_000] {
        let emissions: Vec<u8> = (0..len).map(|_| rng.gen_range(0..6)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &emissions, |b, seq| {
            b.iter(|| {
                ScaledDp::from_emissions(&model, black_box(seq))
                    .unwrap()
                    .expected_counts()
                    .unwrap()
            })
        });
    }
    group.finish();

    let emissions: Vec<u8> = (0..1_000).map(|_| rng.gen_range(0..6)).collect();
    let sequence = TrainingSequence::unlabeled(emissions);
    let config = EstimationConfig::default();
    c.bench_function("baum_welch_step_1000", |b| {
        b.iter(|| baum_welch_step(&model, black_box(&sequence), &config).unwrap())
    });
}

criterion_group!(benches, bench_expected_counts);
criterion_main!(benches);
