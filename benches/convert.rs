use capture_pacer::compositor::OcclusionCompositor;
use capture_pacer::convert::FrameConverter;
use capture_pacer::region::Rect;
use capture_pacer::window::{WindowId, WindowRecord};
use capture_pacer::PixelBuffer;
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_convert_1080p(c: &mut Criterion) {
    let frame = PixelBuffer::filled(1920, 1080, 0xFF20_6080);

    let native = FrameConverter::new(1920, 1080);
    c.bench_function("convert_1080p_frame", |b| {
        b.iter(|| native.convert(&frame))
    });

    let scaled = FrameConverter::new(1280, 720);
    c.bench_function("scale_convert_1080p_to_720p", |b| {
        b.iter(|| scaled.convert(&frame))
    });
}

fn bench_composite_1080p(c: &mut Criterion) {
    let screen = Rect::from_size(0, 0, 1920, 1080);
    let desktop = PixelBuffer::filled(1920, 1080, 0xFF10_1010);
    let windows = vec![
        WindowRecord {
            id: WindowId(1),
            bounds: Rect::from_size(100, 100, 1280, 720),
            belongs_to_target: true,
        },
        WindowRecord {
            id: WindowId(2),
            bounds: Rect::from_size(900, 500, 640, 480),
            belongs_to_target: false,
        },
        WindowRecord {
            id: WindowId(3),
            bounds: Rect::from_size(300, 200, 200, 150),
            belongs_to_target: true,
        },
    ];
    let compositor = OcclusionCompositor::new();

    c.bench_function("composite_1080p_three_windows", |b| {
        b.iter(|| compositor.composite(screen, &windows, &desktop))
    });
}

criterion_group!(benches, bench_convert_1080p, bench_composite_1080p);
criterion_main!(benches);
