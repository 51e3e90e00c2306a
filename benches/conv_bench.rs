use criterion::{black_box, criterion_group, criterion_main, Criterion};
use qconv::config::LayerConfig;
use qconv::conv::{conv_per_channel, conv_per_channel_par, Int16Conv, Int8Conv};
use qconv::reduce::{self, DotReduce, ScalarReduce, StripMined};
use qconv::{ConvParams, TensorView, TensorViewMut};

fn lcg_i8(n: usize, mut seed: u64) -> Vec<i8> {
    (0..n)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            (seed >> 56) as i8
        })
        .collect()
}

fn bench_int8_layer(c: &mut Criterion) {
    let cfg = LayerConfig::default();
    let (in_shape, f_shape, out_shape) = (cfg.input_shape(), cfg.filter_shape(), cfg.output_shape());
    let input = lcg_i8(in_shape.flat_size(), 1);
    let filter = lcg_i8(f_shape.flat_size(), 2);
    let bias = vec![100i32; f_shape.batch()];
    let rescale = cfg.rescale().unwrap();
    let quant = rescale.as_per_channel();
    let iv = TensorView::new(in_shape, &input).unwrap();
    let fv = TensorView::new(f_shape, &filter).unwrap();
    let mut out = vec![0i8; out_shape.flat_size()];

    let strip = StripMined::default();
    let backends: [&dyn DotReduce; 3] = [&ScalarReduce, &strip, reduce::detect()];
    for r in backends {
        c.bench_function(&format!("conv_i8_48x48x16_3x3x32_{}", r.name()), |b| {
            b.iter(|| {
                let mut ov = TensorViewMut::new(out_shape, &mut out).unwrap();
                conv_per_channel::<Int8Conv, _>(r, &cfg.params, &quant, black_box(&iv), &fv, Some(&bias[..]), &mut ov);
            })
        });
    }
    c.bench_function("conv_i8_48x48x16_3x3x32_par", |b| {
        b.iter(|| {
            let mut ov = TensorViewMut::new(out_shape, &mut out).unwrap();
            conv_per_channel_par::<Int8Conv, _>(reduce::detect(), &cfg.params, &quant, black_box(&iv), &fv, Some(&bias[..]), &mut ov);
        })
    });
}

fn bench_int16_layer(c: &mut Criterion) {
    let cfg = LayerConfig::default();
    let params = ConvParams { input_offset: 0, output_offset: 0, ..cfg.params }.with_int16_range();
    let (in_shape, f_shape, out_shape) = (cfg.input_shape(), cfg.filter_shape(), cfg.output_shape());
    let input: Vec<i16> = lcg_i8(in_shape.flat_size(), 3).into_iter().map(|v| v as i16 * 97).collect();
    let filter = lcg_i8(f_shape.flat_size(), 4);
    let rescale = cfg.rescale().unwrap();
    let quant = rescale.as_per_channel();
    let iv = TensorView::new(in_shape, &input).unwrap();
    let fv = TensorView::new(f_shape, &filter).unwrap();
    let mut out = vec![0i16; out_shape.flat_size()];
    let r = reduce::detect();
    c.bench_function(&format!("conv_i16_48x48x16_3x3x32_{}", r.name()), |b| {
        b.iter(|| {
            let mut ov = TensorViewMut::new(out_shape, &mut out).unwrap();
            conv_per_channel::<Int16Conv, _>(r, &params, &quant, black_box(&iv), &fv, None, &mut ov);
        })
    });
}

criterion_group!(benches, bench_int8_layer, bench_int16_layer);
criterion_main!(benches);
