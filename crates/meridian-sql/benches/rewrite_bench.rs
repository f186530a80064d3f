//! Rewriter benchmarks
//!
//! Benchmarks criteria simplification and full command rewriting over
//! representative tree shapes: wide IN lists, deep AND/OR nests with
//! constant subtrees, and a query with sort keys and an inline view.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use meridian_common::types::DataType;
use meridian_sql::{
    rewrite, rewrite_criteria, Catalog, ColumnRef, Command, CompareOp, Criteria, Expression,
    FromClause, FunctionRegistry, OrderByItem, OrderKey, Query, SelectItem, TableRef,
};

fn col(name: &str) -> Expression {
    Expression::column(ColumnRef::new("t", name, DataType::Int32))
}

/// An IN list of `n` members, half of them duplicates
fn wide_in(n: i32) -> Criteria {
    let list = (0..n).map(|i| Expression::integer(i / 2)).collect();
    Criteria::In {
        expr: col("x"),
        list,
        negated: false,
    }
}

/// `depth` alternating AND/OR levels, each carrying one constant
/// comparison to absorb and one data-dependent leaf
fn deep_compound(depth: usize) -> Criteria {
    let mut current = Criteria::compare(col("x"), CompareOp::Eq, Expression::integer(0));
    for level in 0..depth {
        let constant = Criteria::compare(
            Expression::integer(level as i32),
            CompareOp::Le,
            Expression::integer(level as i32 + 1),
        );
        let leaf = Criteria::compare(
            Expression::function(
                "+",
                vec![col("y"), Expression::integer(level as i32)],
                DataType::Int32,
            ),
            CompareOp::Lt,
            Expression::integer(100),
        );
        current = if level % 2 == 0 {
            Criteria::and(vec![current, constant, leaf])
        } else {
            Criteria::or(vec![current, constant.clone(), Criteria::not(leaf)])
        };
    }
    current
}

fn query_with_view() -> Command {
    let inner = Query::from_table(
        TableRef::new("t"),
        vec![
            SelectItem::aliased(col("x"), "a"),
            SelectItem::aliased(col("y"), "b"),
        ],
    );
    let mut q = Query::projection(vec![
        SelectItem::new(Expression::column(ColumnRef::new(
            "v",
            "a",
            DataType::Int32,
        ))),
        SelectItem::new(Expression::column(ColumnRef::new(
            "v",
            "b",
            DataType::Int32,
        ))),
    ]);
    q.from = vec![FromClause::InlineView {
        query: Box::new(Command::Query(inner)),
        alias: "v".to_string(),
    }];
    q.where_clause = Some(Criteria::and(vec![
        Criteria::compare(
            Expression::column(ColumnRef::new("v", "a", DataType::Int32)),
            CompareOp::Gt,
            Expression::integer(10),
        ),
        Criteria::compare(Expression::integer(1), CompareOp::Eq, Expression::integer(1)),
    ]));
    q.order_by = vec![
        OrderByItem::asc(OrderKey::Ordinal(2)),
        OrderByItem::desc(OrderKey::Name("a".to_string())),
    ];
    Command::Query(q)
}

fn criteria_rewriting(c: &mut Criterion) {
    let catalog = Catalog::new();
    let registry = FunctionRegistry::new();
    let mut group = c.benchmark_group("criteria");

    for size in [16, 64, 256] {
        let input = wide_in(size);
        group.bench_with_input(BenchmarkId::new("in_dedup", size), &input, |b, input| {
            b.iter(|| {
                let out = rewrite_criteria(input.clone(), &catalog, &registry, None).unwrap();
                criterion::black_box(out);
            })
        });
    }

    for depth in [4, 8, 16] {
        let input = deep_compound(depth);
        group.bench_with_input(
            BenchmarkId::new("compound_absorption", depth),
            &input,
            |b, input| {
                b.iter(|| {
                    let out = rewrite_criteria(input.clone(), &catalog, &registry, None).unwrap();
                    criterion::black_box(out);
                })
            },
        );
    }

    group.finish();
}

fn command_rewriting(c: &mut Criterion) {
    let catalog = Catalog::new();
    let registry = FunctionRegistry::new();
    let input = query_with_view();

    c.bench_function("command/view_pushdown", |b| {
        b.iter(|| {
            let out = rewrite(input.clone(), &catalog, &registry, None).unwrap();
            criterion::black_box(out);
        })
    });
}

criterion_group!(benches, criteria_rewriting, command_rewriting);
criterion_main!(benches);
