use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use doppler::kernels::matmul::matmul_cpu_ref;
use doppler::kernels::rmsnorm::rms_norm_cpu_ref;
use doppler::package::Dtype;
use doppler::sampler::{sample, SamplerOptions};
use rand::thread_rng;

fn bench_rmsnorm_hidden_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("rmsnorm");
    for hidden_size in [256, 1024, 4096].iter() {
        let x = vec![0.5f32; *hidden_size];
        let w = vec![1.0f32; *hidden_size];
        group.bench_with_input(BenchmarkId::from_parameter(hidden_size), hidden_size, |b, &h| {
            b.iter(|| rms_norm_cpu_ref(black_box(&x), 1, h, black_box(&w), 1e-6, false));
        });
    }
    group.finish();
}

fn bench_matmul_vocab_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul_f32");
    for (hidden_size, vocab_size) in [(256, 1000), (1024, 32_000)].iter() {
        let a = vec![0.1f32; *hidden_size];
        let b_bytes: Vec<u8> = bytemuck::cast_slice(&vec![0.2f32; hidden_size * vocab_size]).to_vec();
        group.bench_with_input(
            BenchmarkId::new("vocab_projection", format!("{hidden_size}x{vocab_size}")),
            &(*hidden_size, *vocab_size),
            |bencher, &(k, n)| {
                bencher.iter(|| matmul_cpu_ref(black_box(&a), 1, k, black_box(&b_bytes), Dtype::F32, n, true));
            },
        );
    }
    group.finish();
}

fn bench_sampler(c: &mut Criterion) {
    let logits: Vec<f32> = (0..32_000).map(|i| (i % 97) as f32 * 0.01).collect();
    let previous_tokens: Vec<u32> = (0..64).collect();
    let options = SamplerOptions::default();
    let mut rng = thread_rng();

    c.bench_function("sampler_top_k_top_p", |b| {
        b.iter(|| sample(black_box(&logits), black_box(&options), black_box(&previous_tokens), &mut rng));
    });
}

criterion_group!(benches, bench_rmsnorm_hidden_sizes, bench_matmul_vocab_projection, bench_sampler);
criterion_main!(benches);
