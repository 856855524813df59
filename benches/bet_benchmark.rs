use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wagerlab::bet::{BetSolver, WagerSettings};
use wagerlab::tax::TaxSchedule;

fn random_probabilities(count: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(0xBE7 + count as u64);
    (0..count).map(|_| rng.gen_range(0.0..=1.0)).collect()
}

fn benchmark_bet_solver(c: &mut Criterion) {
    let tax = TaxSchedule::experiment_default();
    let steps = [10.0_f64, 1.0, 0.1];

    let mut group = c.benchmark_group("optimal_bet");
    for &step in &steps {
        let settings = WagerSettings {
            step,
            ..WagerSettings::default()
        };
        let solver = BetSolver::new(settings, &tax).unwrap();
        group.throughput(Throughput::Elements(settings.candidate_count() as u64));

        group.bench_with_input(BenchmarkId::new("single", step), &solver, |b, solver| {
            b.iter(|| {
                let bet = solver.solve(black_box(0.37)).unwrap();
                black_box(bet);
            });
        });
    }
    group.finish();

    let solver = BetSolver::new(WagerSettings::default(), &tax).unwrap();
    let mut group = c.benchmark_group("optimal_bet_batch");
    for count in [64_usize, 1024] {
        let probabilities = random_probabilities(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("solve_many", count), &probabilities, |b, input| {
            b.iter(|| {
                let decisions = solver.solve_many(black_box(input)).unwrap();
                black_box(decisions);
            });
        });
    }
    group.finish();
}

criterion_group!(bet_benchmark, benchmark_bet_solver);
criterion_main!(bet_benchmark);
