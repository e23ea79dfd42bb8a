use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use facturo_core::{Aggregate, AggregateId, Money, Quantity, TenantId, VatRate};
use facturo_invoicing::{
    CreateDraft, Document, DocumentCommand, DocumentId, DocumentKind, DocumentTotalsAggregator,
    DraftHeader, DraftItem, LineItem, LineItemCalculator, LineItemId, LineItemInput, RateScope,
    ReorderItems,
};
use facturo_vat::{ScenarioKey, VatMentionSelection};

const RATES: [u8; 5] = [17, 14, 8, 3, 0];

fn inputs(count: usize) -> Vec<LineItemInput> {
    (0..count)
        .map(|i| {
            LineItemInput::new(
                format!("line {i}"),
                Quantity::parse(&format!("{}.25", i % 7 + 1)).unwrap(),
                Money::parse(&format!("{}.99", 10 + i)).unwrap(),
                VatRate::percent(RATES[i % RATES.len()]).unwrap(),
            )
        })
        .collect()
}

fn items(count: usize) -> Vec<LineItem> {
    inputs(count)
        .iter()
        .enumerate()
        .map(|(i, input)| LineItem::build(LineItemId::new(), input, i as u32 + 1, false).unwrap())
        .collect()
}

fn draft(count: usize) -> (Document, TenantId) {
    let tenant_id = TenantId::new();
    let document_id = DocumentId::new(AggregateId::new());
    let mut document = Document::empty(document_id);
    document
        .execute(&DocumentCommand::CreateDraft(CreateDraft {
            tenant_id,
            document_id,
            kind: DocumentKind::Invoice,
            header: DraftHeader::new(None, VatMentionSelection::default()),
            rate_scope: RateScope::new(
                ScenarioKey::Domestic,
                RATES.map(|r| VatRate::percent(r).unwrap()),
            )
            .unwrap(),
            credit_note_of: None,
            items: inputs(count).into_iter().map(DraftItem::new).collect(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
    (document, tenant_id)
}

fn bench_line_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_item_compute");
    let quantity = Quantity::parse("3.3333").unwrap();
    let price = Money::parse("19.99").unwrap();
    let rate = VatRate::percent(17).unwrap();

    group.bench_function("compute", |b| {
        b.iter(|| LineItemCalculator::compute(black_box(quantity), black_box(price), black_box(rate)).unwrap());
    });

    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_totals_aggregate");

    for count in [10usize, 100, 1_000] {
        let lines = items(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &lines, |b, lines| {
            b.iter(|| DocumentTotalsAggregator::aggregate(black_box(lines)).unwrap());
        });
    }

    group.finish();
}

/// Reordering is the quiet path: no totals are recomputed.
fn bench_reorder_vs_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("reorder_vs_recompute");
    let (document, tenant_id) = draft(200);
    let mut order: Vec<LineItemId> = document.items().iter().map(|i| i.id).collect();
    order.reverse();
    let reorder = DocumentCommand::ReorderItems(ReorderItems {
        tenant_id,
        document_id: document.id_typed(),
        order,
        occurred_at: Utc::now(),
    });

    group.bench_function("reorder_200", |b| {
        b.iter(|| document.handle(black_box(&reorder)).unwrap());
    });
    group.bench_function("recompute_200", |b| {
        b.iter(|| DocumentTotalsAggregator::aggregate(black_box(document.items())).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_line_computation,
    bench_aggregation,
    bench_reorder_vs_recompute
);
criterion_main!(benches);
