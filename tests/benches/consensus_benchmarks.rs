//! # Omne Consensus Benchmarks
//!
//! | Path                       | Expectation                         |
//! |----------------------------|-------------------------------------|
//! | Proposer selection         | O(n) in validators, well under 1ms  |
//! | Attestation pool add       | O(1) per attestation                |
//! | Quorum aggregation         | O(1) with running weights           |
//! | Slashing history check     | O(log n) votes, O(r) ranges         |
//! | Ed25519 verify             | < 100us                             |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use omne_consensus::adapters::{Ed25519ValidatorKey, Ed25519Verifier};
use omne_consensus::domain::{MessageKind, SignedVote, SlashingHistory};
use omne_consensus::{
    select_proposer, Attestation, AttestationPool, QuorumThreshold, SignatureVerifier,
    ValidatorInfo, ValidatorKey, ValidatorSet,
};
use rand::Rng;
use shared_types::{Layer, SlotId, ValidatorId};
use std::sync::Arc;
use std::time::Duration;

fn random_set(size: usize) -> ValidatorSet {
    let mut rng = rand::thread_rng();
    let validators = (0..size)
        .map(|_| {
            let id: [u8; 32] = rng.gen();
            ValidatorInfo::new(ValidatorId::new(id), rng.gen_range(1..10_000), id)
        })
        .collect();
    ValidatorSet::new(0, validators)
}

// ============================================================================
// Proposer selection
// ============================================================================

fn bench_proposer_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("proposer-selection");
    let seed = [0x5e; 32];

    for size in [100, 1_000, 10_000] {
        let set = random_set(size);
        group.bench_with_input(BenchmarkId::new("select", size), &set, |b, set| {
            let mut slot = 0u64;
            b.iter(|| {
                slot += 1;
                black_box(select_proposer(Layer::Commerce, slot, set, &seed).ok())
            })
        });
    }
    group.finish();
}

// ============================================================================
// Attestation pool
// ============================================================================

fn bench_attestation_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("attestation-pool");
    group.measurement_time(Duration::from_secs(10));

    for size in [100, 1_000, 10_000] {
        let set = Arc::new(random_set(size));
        let slot = SlotId::from_number(Layer::Commerce, 1, 180);
        let block = [0xB1; 32];
        let attestations: Vec<Attestation> = set
            .iter()
            .map(|v| Attestation::unsigned(slot, block, v.id, None))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("add_all_then_aggregate", size),
            &attestations,
            |b, attestations| {
                b.iter(|| {
                    let mut pool = AttestationPool::new(QuorumThreshold::TWO_THIRDS, set.clone());
                    for attestation in attestations {
                        let _ = pool.add(attestation.clone());
                    }
                    black_box(pool.aggregate(Layer::Commerce, 1, &block))
                })
            },
        );
    }
    group.finish();
}

// ============================================================================
// Slashing protection
// ============================================================================

fn bench_slashing_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("slashing-history");
    let validator = ValidatorId::new([0xAA; 32]);

    let mut history = SlashingHistory::new();
    for slot in 0..10_000u64 {
        history.record(&SignedVote {
            validator,
            layer: Layer::Commerce,
            kind: MessageKind::Attestation,
            slot,
            digest: [slot as u8; 32],
            checkpoint_range: None,
        });
    }

    let fresh = SignedVote {
        validator,
        layer: Layer::Commerce,
        kind: MessageKind::Attestation,
        slot: 20_000,
        digest: [1; 32],
        checkpoint_range: None,
    };
    let double = SignedVote {
        slot: 5_000,
        digest: [0xFF; 32],
        ..fresh.clone()
    };

    group.bench_function("check_fresh_vote", |b| {
        b.iter(|| black_box(history.check(&fresh).is_ok()))
    });
    group.bench_function("check_double_vote", |b| {
        b.iter(|| black_box(history.check(&double).is_err()))
    });
    group.finish();
}

// ============================================================================
// Signatures
// ============================================================================

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("ed25519");
    let key = Ed25519ValidatorKey::from_seed([9; 32]);
    let digest = [0x42; 32];
    let signature = key.sign(&digest).unwrap_or_default();
    let verifier = Ed25519Verifier;
    let public_key = key.public_key();

    group.bench_function("sign", |b| b.iter(|| black_box(key.sign(&digest).is_ok())));
    group.bench_function("verify", |b| {
        b.iter(|| black_box(verifier.verify(&public_key, &digest, &signature)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_proposer_selection,
    bench_attestation_pool,
    bench_slashing_check,
    bench_signatures
);
criterion_main!(benches);
