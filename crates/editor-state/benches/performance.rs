use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use editor_state::{ConfigPatch, EditorSession, MemoryClipboard, Point};
use std::rc::Rc;
use std::time::{Duration, Instant};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (editor-state benchmark line)\n"
        ));
    }
    out.pop();
    out
}

fn session(text: &str) -> EditorSession {
    EditorSession::builder()
        .text(text)
        .clipboard(Rc::new(MemoryClipboard::new()))
        .build()
        .unwrap()
}

fn finish_layout(session: &mut EditorSession) {
    while session.do_background_work(Instant::now() + Duration::from_millis(50)) {}
}

fn bench_large_file_open(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("large_file_open/50k_lines", |b| {
        b.iter(|| {
            let session = session(black_box(&text));
            black_box(session.screen_line_count());
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || {
                let mut s = session(&text);
                s.set_cursor_buffer_position(Point::new(25_000, 10));
                s
            },
            |mut s| {
                for _ in 0..100 {
                    s.insert_text("x").unwrap();
                }
                black_box(s.cursor_buffer_positions());
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_viewport_screen_lines(c: &mut Criterion) {
    let text = large_text(50_000);
    let mut s = session(&text);
    finish_layout(&mut s);
    let start_row = 25_000;
    let count = 60;

    c.bench_function("viewport_render/60_lines", |b| {
        b.iter(|| {
            black_box(s.screen_lines(start_row, start_row + count));
        })
    });
}

fn bench_soft_wrap_relayout(c: &mut Criterion) {
    let text = large_text(10_000);
    c.bench_function("soft_wrap_relayout/10k_lines", |b| {
        b.iter_batched(
            || session(&text),
            |mut s| {
                s.update(&ConfigPatch {
                    soft_wrapped: Some(true),
                    editor_width_in_chars: Some(40),
                    ..ConfigPatch::default()
                })
                .unwrap();
                finish_layout(&mut s);
                black_box(s.screen_line_count());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_large_file_open,
    bench_typing_in_middle,
    bench_viewport_screen_lines,
    bench_soft_wrap_relayout
);
criterion_main!(benches);
