use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hidden_markov::hmm::{MarkovModel, MarkovModelBuilder, Viterbi};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SYMBOLS: [u8; 4] = [b'A', b'C', b'G', b'T'];

fn random_model(num_states: usize, seed: u64) -> MarkovModel<usize, u8> {
    let mut builder = MarkovModelBuilder::new(0..num_states, SYMBOLS).unwrap();
    builder.allow_all_transitions();
    builder.set_random_probabilities_seeded(seed);
    builder.build().unwrap()
}

fn random_sequence(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len).map(|_| SYMBOLS[rng.gen_range(0..4)]).collect()
}

fn bench_viterbi(c: &mut Criterion) {
    let mut group = c.benchmark_group("viterbi");
    for &num_states in &[2usize, 8, 32] {
        let model = random_model(num_states, 1);
        let decoder = Viterbi::new(&model);
        let sequence = random_sequence(1_000, 2);
        group.bench_with_input(
            BenchmarkId::from_parameter(num_states),
            &sequence,
            |b, seq| b.iter(|| decoder.decode(black_box(seq)).unwrap()),
        );
    }
    group.finish();
}

fn bench_viterbi_batch(c: &mut Criterion) {
    let model = random_model(8, 3);
    let decoder = Viterbi::new(&model);
    let sequences: Vec<Vec<u8>> = (0..64).map(|i| random_sequence(500, i)).collect();
    c.bench_function("viterbi_batch_64x500", |b| {
        b.iter(|| decoder.decode_batch(black_box(&sequences)))
    });
}

criterion_group!(benches, bench_viterbi, bench_viterbi_batch);
criterion_main!(benches);
