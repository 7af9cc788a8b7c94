//! Performance benchmarks for team balancing and registration parsing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pug_lobby::balance::{RoleBalancer, TeamBalancer};
use pug_lobby::registration::parse::{parse_regions, parse_roles};
use pug_lobby::types::{PlayerProfile, Role};

fn roster(size: usize) -> Vec<PlayerProfile> {
    let preferences = [
        vec![Role::Dps],
        vec![Role::Tank, Role::Support],
        vec![Role::Support],
        Role::ALL.to_vec(),
        vec![Role::Tank],
    ];

    (0..size)
        .map(|i| PlayerProfile {
            id: format!("player{}", i),
            regions: vec!["eu".to_string()],
            battle_tag: format!("Player{}#{}", i, 1000 + i),
            skill_rating: ((i * 737) % 5000) as u32,
            roles: preferences[i % preferences.len()].clone(),
            voice_preference: i % 2 == 0,
        })
        .collect()
}

fn bench_balance(c: &mut Criterion) {
    let balancer = RoleBalancer::new();
    let mut group = c.benchmark_group("balance_two_teams");

    for size in [4usize, 12, 48] {
        let players = roster(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &players, |b, players| {
            b.iter(|| black_box(balancer.balance(players, 2)))
        });
    }

    group.finish();
}

fn bench_parsing(c: &mut Criterion) {
    let regions = vec!["eu".to_string(), "na".to_string(), "oce".to_string()];

    c.bench_function("parse_regions", |b| {
        b.iter(|| black_box(parse_regions(black_box("EU, NA and OCE"), &regions)))
    });

    c.bench_function("parse_roles", |b| {
        b.iter(|| black_box(parse_roles(black_box("Tank, Support and DPS!"))))
    });
}

criterion_group!(benches, bench_balance, bench_parsing);
criterion_main!(benches);
