use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pipe_bridge::audio::{metadata, AudioBlock};
use pipe_bridge::codec::{PcmDecoder, PcmEncoder};
use pipe_bridge::config::AudioFormat;

fn framing(c: &mut Criterion) {
    let format = AudioFormat::default();
    let block = AudioBlock::new(
        (0..44100 * 2).map(|i| (i as f32 * 0.001).sin()).collect(),
        format.channels,
    )
    .with_metadata(22050, metadata([("title", "bench")]))
    .ending_track();

    c.bench_function("frame 1s stereo block", |b| {
        let mut encoder = PcmEncoder::new(format);
        b.iter(|| encoder.frame(black_box(&block)).unwrap())
    });

    let pcm = pipe_bridge::codec::encoder::encode_samples(&block.samples);
    c.bench_function("decode 1s stereo in 1024-byte reads", |b| {
        b.iter(|| {
            let mut decoder = PcmDecoder::new(format);
            let mut samples = 0;
            for piece in pcm.chunks(1024) {
                samples += decoder.decode(black_box(piece)).unwrap().len();
            }
            samples
        })
    });
}

criterion_group!(benches, framing);
criterion_main!(benches);
