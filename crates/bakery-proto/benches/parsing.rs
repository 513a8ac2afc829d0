//! Benchmarks for condition parsing and caveat opening.

use bakery_proto::{Condition, KeyPair, ThirdPartyCaveat};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const LOGIN: &str = "is-authenticated-user";
const LOGIN_DOMAIN: &str = "is-authenticated-user @ubuntu";
const MEMBER_OF: &str = "is-member-of group1 group2 group3 group4 @canonical";

fn benchmark_conditions(c: &mut Criterion) {
    let mut group = c.benchmark_group("Condition Parsing");

    group.bench_function("login", |b| {
        b.iter(|| {
            let cond: Condition = black_box(LOGIN).parse().unwrap();
            black_box(cond)
        })
    });

    group.bench_function("login_domain", |b| {
        b.iter(|| {
            let cond: Condition = black_box(LOGIN_DOMAIN).parse().unwrap();
            black_box(cond)
        })
    });

    group.bench_function("member_of", |b| {
        b.iter(|| {
            let cond: Condition = black_box(MEMBER_OF).parse().unwrap();
            black_box(cond)
        })
    });

    group.finish();
}

fn benchmark_open(c: &mut Criterion) {
    let rp = KeyPair::generate();
    let idm = KeyPair::generate();
    let id = ThirdPartyCaveat::seal(&rp, &idm.public_key(), &[3u8; 32], MEMBER_OF).unwrap();

    c.bench_function("open_third_party_caveat", |b| {
        b.iter(|| {
            let cav = ThirdPartyCaveat::open(&idm, black_box(&id)).unwrap();
            black_box(cav)
        })
    });
}

criterion_group!(benches, benchmark_conditions, benchmark_open);
criterion_main!(benches);
