//! Benchmarks for ILAst child collections.
//!
//! Tests the cost of the operations decompiler passes run most often:
//! - `index_of` with an accurate position cache and with an aliased element
//! - Bulk predicate removal against a `remove_at` loop
//! - Insertion at the front, which shifts every cached position
//! - Guarded traversal with in-place replacement

extern crate dotscope_ilast;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use dotscope_ilast::ast::{IlNode, IlNodeRc, IlOpCode, IlOperand, InstructionCollection};
use std::hint::black_box;

const SIZE: i32 = 1_000;

fn filled_block() -> (IlNodeRc, InstructionCollection) {
    let block = IlNode::new(IlOpCode::Block);
    let instructions = block.collection(0).unwrap();
    instructions
        .add_range((0..SIZE).map(IlNode::ldc_i4))
        .unwrap();
    (block, instructions)
}

fn is_even(node: &IlNodeRc) -> bool {
    matches!(node.operand(), IlOperand::I4(value) if value % 2 == 0)
}

/// Benchmark `index_of` on the last element while it trusts this collection.
fn bench_index_of_cached(c: &mut Criterion) {
    let (_block, instructions) = filled_block();
    let last = instructions.last().unwrap();

    c.bench_function("index_of_cached", |b| {
        b.iter(|| black_box(instructions.index_of(black_box(&last))));
    });
}

/// Benchmark `index_of` on the last element after a second collection took its cache.
fn bench_index_of_aliased(c: &mut Criterion) {
    let (_block, instructions) = filled_block();
    let last = instructions.last().unwrap();

    let other = IlNode::new(IlOpCode::Block);
    other.collection(0).unwrap().add(last.clone()).unwrap();

    c.bench_function("index_of_aliased", |b| {
        b.iter(|| black_box(instructions.index_of(black_box(&last))));
    });
}

/// Benchmark removing every second element in a single pass.
fn bench_remove_all(c: &mut Criterion) {
    c.bench_function("remove_all_even", |b| {
        b.iter_batched(
            filled_block,
            |(block, instructions)| {
                let removed = instructions.remove_all(is_even).unwrap();
                black_box((block, removed))
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark removing every second element with repeated `remove_at` calls.
fn bench_remove_at_loop(c: &mut Criterion) {
    c.bench_function("remove_at_loop_even", |b| {
        b.iter_batched(
            filled_block,
            |(block, instructions)| {
                let mut i = 0;
                while i < instructions.len() {
                    if is_even(&instructions.get(i).unwrap()) {
                        instructions.remove_at(i).unwrap();
                    } else {
                        i += 1;
                    }
                }
                black_box(block)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark inserting at the front, which renumbers every following element.
fn bench_insert_front(c: &mut Criterion) {
    c.bench_function("insert_front", |b| {
        b.iter_batched(
            filled_block,
            |(block, instructions)| {
                instructions.insert(0, IlNode::nop()).unwrap();
                black_box(block)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark a full traversal that replaces every element in place.
fn bench_traverse_and_replace(c: &mut Criterion) {
    c.bench_function("traverse_replace", |b| {
        b.iter_batched(
            filled_block,
            |(block, instructions)| {
                let mut cursor = instructions.iter();
                while cursor.next().is_some() {
                    cursor.replace_current(IlNode::nop()).unwrap();
                }
                drop(cursor);
                black_box(block)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_index_of_cached,
    bench_index_of_aliased,
    bench_remove_all,
    bench_remove_at_loop,
    bench_insert_front,
    bench_traverse_and_replace,
);
criterion_main!(benches);
