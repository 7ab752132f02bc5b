use std::io::Write;

use criterion::{Criterion, criterion_group, criterion_main};
use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;

use nrmatch::{
    DetectorInput, FittingFactorSearch, NelderMead, NetworkObjective, NrFileSource,
    WaveformParams, WaveformSource,
};

const DELTA_T: f64 = 1.0 / 512.0;
const F_MIN: f64 = 30.0;
const SEGMENT: usize = 2048;

fn chirp_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let n = 3000;
    for i in 0..n {
        let t = i as f64;
        let phi = 2.0 * std::f64::consts::PI * (0.02 * t + 6.667e-6 * t * t);
        let amp = 0.2 + 0.2 * (t / n as f64);
        writeln!(file, "{t:.4} {:.8} {:.8}", amp * phi.cos(), amp * phi.sin()).unwrap();
    }
    file
}

fn netmatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("netmatch");
    group.sample_size(10);

    let file = chirp_file();
    let params = WaveformParams::new(180.0, 0.0, DELTA_T, F_MIN);
    let (mut hp, _) = NrFileSource.polarizations(file.path(), &params).unwrap();
    hp.resize(SEGMENT);
    let sample = hp.data.to_vec();
    let asd = Array1::from_elem(SEGMENT / 2 + 1, 1.0);

    let objective = NetworkObjective::new(
        &NrFileSource,
        file.path(),
        (150.0, 220.0),
        DetectorInput { data: &sample, asd: &asd },
        DetectorInput { data: &sample, asd: &asd },
        DELTA_T,
        F_MIN,
    );

    group.bench_function("objective evaluation", |b| {
        b.iter(|| objective.network_match(175.0, 30.0))
    });

    group.bench_function("fitting factor search", |b| {
        b.iter(|| {
            let mut rng = StdRng::seed_from_u64(1);
            FittingFactorSearch::new(objective)
                .with_minimizer(NelderMead::default().with_max_evaluations(100))
                .run(&mut rng)
        })
    });
}

criterion_group!(benches, netmatch_benchmark);
criterion_main!(benches);
