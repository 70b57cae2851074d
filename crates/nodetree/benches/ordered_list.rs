use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nodetree::{Linked, Links, Mount, NodeArena, NodeList, OrderedList};

struct Entry {
    value: usize,
    links: Links,
}

impl Linked for Entry {
    fn links(&self) -> &Links {
        &self.links
    }
}

fn entry(value: usize) -> Entry {
    Entry {
        value,
        links: Links::new(),
    }
}

fn filled(count: usize) -> OrderedList<Entry> {
    let mut list = OrderedList::new();
    for value in 0..count {
        list.add(entry(value));
    }
    list
}

fn bench_add(c: &mut Criterion) {
    c.bench_function("add_10k", |b| b.iter(|| black_box(filled(10_000))));
}

fn bench_remove_and_sort(c: &mut Criterion) {
    c.bench_function("remove_every_third_then_sort_10k", |b| {
        b.iter_batched(
            || filled(10_000),
            |mut list| {
                let mut index = 0;
                while index < list.physical_len() {
                    if index % 3 == 0 && list.get(index).is_ok() {
                        let _ = list.remove_and_swap(index);
                    }
                    index += 1;
                }
                list.sort_list();
                black_box(list.len())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_iterate(c: &mut Criterion) {
    let list = filled(10_000);
    c.bench_function("iter_10k", |b| {
        b.iter(|| list.iter().map(|entry| entry.value).sum::<usize>())
    });
}

fn bench_render(c: &mut Criterion) {
    let mut arena = NodeArena::new();
    let rows: Vec<_> = (0..1_000)
        .map(|i| {
            let label = arena.text(format!("row {}", i), []);
            arena.element("li", format!("li{}", i), [Mount::from(label)])
        })
        .collect();
    let list = arena.element("ul", "rows", [Mount::from(NodeList(rows))]);

    c.bench_function("render_1k_rows", |b| {
        b.iter(|| black_box(arena.render_node(list)))
    });
}

criterion_group!(
    benches,
    bench_add,
    bench_remove_and_sort,
    bench_iterate,
    bench_render
);
criterion_main!(benches);
