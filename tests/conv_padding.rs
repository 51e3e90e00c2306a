use pretty_assertions::assert_eq;
use qconv::conv::{conv_i16, conv_i8, conv_per_channel, ConvParams, Int8Conv};
use qconv::quant::ChannelRescale;
use qconv::reduce::StripMined;
use qconv::{Shape4, TensorView, TensorViewMut};

fn run_i8(params: &ConvParams, rescale: &ChannelRescale, in_shape: Shape4, input: &[i8], f_shape: Shape4, filter: &[i8], bias: Option<&[i32]>) -> Vec<i8> {
    let out_shape = params.output_shape(&in_shape, &f_shape);
    let mut out = vec![0i8; out_shape.flat_size()];
    let iv = TensorView::new(in_shape, input).unwrap();
    let fv = TensorView::new(f_shape, filter).unwrap();
    let mut ov = TensorViewMut::new(out_shape, &mut out).unwrap();
    conv_i8(params, &rescale.as_per_channel(), &iv, &fv, bias, &mut ov);
    out
}

#[test]
fn tens_times_twos_with_same_padding() {
    // 9 taps * 10 * 2 = 180 in the interior, clamped to the int8 maximum
    let params = ConvParams { pad_h: 1, pad_w: 1, ..Default::default() }.with_int8_range();
    let out = run_i8(&params, &ChannelRescale::identity(1), Shape4::new(1, 4, 4, 1), &[10; 16], Shape4::new(1, 3, 3, 1), &[2; 9], None);
    #[rustfmt::skip]
    let want = vec![
         80, 120, 120,  80,
        120, 127, 127, 120,
        120, 127, 127, 120,
         80, 120, 120,  80,
    ];
    assert_eq!(out, want);
}

#[test]
fn tens_times_twos_int16_is_not_clamped() {
    let params = ConvParams { pad_h: 1, pad_w: 1, ..Default::default() }.with_int16_range();
    let rescale = ChannelRescale::identity(1);
    let input = [10i16; 16];
    let filter = [2i8; 9];
    let out_shape = Shape4::new(1, 4, 4, 1);
    let mut out = [0i16; 16];
    let iv = TensorView::new(Shape4::new(1, 4, 4, 1), &input).unwrap();
    let fv = TensorView::new(Shape4::new(1, 3, 3, 1), &filter).unwrap();
    let mut ov = TensorViewMut::new(out_shape, &mut out).unwrap();
    conv_i16(&params, &rescale.as_per_channel(), &iv, &fv, None, &mut ov);
    #[rustfmt::skip]
    let want = [
         80, 120, 120,  80,
        120, 180, 180, 120,
        120, 180, 180, 120,
         80, 120, 120,  80,
    ];
    assert_eq!(out, want);
}

#[test]
fn padded_taps_contribute_nothing_even_with_input_offset() {
    // Taps outside the image must not pick up input_offset * weight.
    let params = ConvParams { pad_h: 1, pad_w: 1, input_offset: 3, ..Default::default() }.with_int8_range();
    let rescale = ChannelRescale::identity(1);
    let input: Vec<i8> = (0..16).map(|i| (i % 3) as i8 - 1).collect();
    let filter: [i8; 9] = [3, -2, 1, -1, 2, -3, 2, 1, -1];
    let full = run_i8(&params, &rescale, Shape4::new(1, 4, 4, 1), &input, Shape4::new(1, 3, 3, 1), &filter, None);

    // Top-left output only sees rows/cols 1..3 of the filter; zero the rest.
    let mut inner = filter;
    for (i, w) in inner.iter_mut().enumerate() {
        if i / 3 == 0 || i % 3 == 0 {
            *w = 0;
        }
    }
    let masked = run_i8(&params, &rescale, Shape4::new(1, 4, 4, 1), &input, Shape4::new(1, 3, 3, 1), &inner, None);
    assert_eq!(full[0], masked[0]);
}

#[test]
fn implicit_padding_equals_explicit_neutral_border() {
    // Explicitly padding with -input_offset makes (x + offset) zero on the border.
    let offset = 5;
    let params = ConvParams { pad_h: 1, pad_w: 1, input_offset: offset, ..Default::default() }.with_int8_range();
    let rescale = ChannelRescale { multiplier: vec![1 << 30; 2], shift: vec![-1; 2] };
    let in_shape = Shape4::new(1, 5, 4, 3);
    let input: Vec<i8> = (0..in_shape.flat_size()).map(|i| ((i * 7) % 9) as i8 - 4).collect();
    let f_shape = Shape4::new(2, 3, 3, 3);
    let filter: Vec<i8> = (0..f_shape.flat_size()).map(|i| ((i * 5) % 7) as i8 - 3).collect();
    let bias = [11, -6];
    let implicit = run_i8(&params, &rescale, in_shape, &input, f_shape, &filter, Some(&bias[..]));

    let padded_shape = Shape4::new(1, 7, 6, 3);
    let mut padded = vec![-offset as i8; padded_shape.flat_size()];
    for y in 0..5 {
        for x in 0..4 {
            for c in 0..3 {
                padded[padded_shape.offset(0, y + 1, x + 1, c)] = input[in_shape.offset(0, y, x, c)];
            }
        }
    }
    let unpadded = ConvParams { pad_h: 0, pad_w: 0, ..params };
    let explicit = run_i8(&unpadded, &rescale, padded_shape, &padded, f_shape, &filter, Some(&bias[..]));
    assert_eq!(implicit, explicit);
}

#[test]
fn missing_bias_equals_zero_bias() {
    let params = ConvParams { stride_h: 2, stride_w: 1, pad_h: 1, pad_w: 2, input_offset: -7, output_offset: 3, ..Default::default() }.with_int8_range();
    let rescale = ChannelRescale { multiplier: vec![1_500_000_000, 1 << 30, 900_000_000], shift: vec![-3, -2, -4] };
    let in_shape = Shape4::new(2, 6, 5, 10);
    let input: Vec<i8> = (0..in_shape.flat_size()).map(|i| (i as i32 * 31 % 256 - 128) as i8).collect();
    let f_shape = Shape4::new(3, 3, 2, 10);
    let filter: Vec<i8> = (0..f_shape.flat_size()).map(|i| (i as i32 * 17 % 255 - 127) as i8).collect();
    let none = run_i8(&params, &rescale, in_shape, &input, f_shape, &filter, None);
    let zeros = run_i8(&params, &rescale, in_shape, &input, f_shape, &filter, Some(&[0, 0, 0][..]));
    assert_eq!(none, zeros);
}

#[test]
fn clamp_yields_exact_bounds() {
    // Single tap, single channel: acc = (x + 0) * w
    let params = ConvParams { activation_min: -20, activation_max: 30, ..Default::default() };
    let rescale = ChannelRescale::identity(1);
    let shape = Shape4::new(1, 1, 1, 1);
    let cases: [(i8, i8, i8); 5] = [(100, 100, 30), (-100, 100, -20), (5, 5, 25), (-4, 5, -20), (127, -128, -20)];
    for (x, w, want) in cases {
        let out = run_i8(&params, &rescale, shape, &[x], shape, &[w], None);
        assert_eq!(out, vec![want], "x={} w={}", x, w);
    }
}

#[test]
fn output_offset_is_applied_before_clamp() {
    let params = ConvParams { output_offset: -128, ..Default::default() }.with_int8_range();
    let rescale = ChannelRescale::identity(1);
    let shape = Shape4::new(1, 1, 1, 1);
    assert_eq!(run_i8(&params, &rescale, shape, &[100], shape, &[2], None), vec![72]);
    assert_eq!(run_i8(&params, &rescale, shape, &[-100], shape, &[2], None), vec![-128]);
}

#[test]
fn dilation_skips_between_taps() {
    // 1x3 kernel with dilation 2 over one row: taps at x, x+2, x+4
    let params = ConvParams { dilation_w: 2, ..Default::default() }.with_int8_range();
    let rescale = ChannelRescale::identity(1);
    let input: Vec<i8> = (1..=7).collect();
    let out = run_i8(&params, &rescale, Shape4::new(1, 1, 7, 1), &input, Shape4::new(1, 1, 3, 1), &[1, 2, 3], None);
    assert_eq!(out.len(), 3);
    let want: Vec<i8> = (0..3).map(|x| (x + 1) + 2 * (x + 3) + 3 * (x + 5)).collect();
    assert_eq!(out, want);
}

#[test]
fn vector_tail_is_covered_by_short_grant() {
    // 19 channels with a 16-lane grant leaves a 3-lane strip: sum(1..=19) = 190, halved.
    let params = ConvParams { input_offset: 1, ..Default::default() }.with_int8_range();
    let half = ChannelRescale { multiplier: vec![1 << 30], shift: vec![0] };
    let shape = Shape4::new(1, 1, 1, 19);
    let input: Vec<i8> = (0..19).collect();
    let filter = vec![1i8; 19];
    let iv = TensorView::new(shape, &input).unwrap();
    let fv = TensorView::new(shape, &filter).unwrap();
    let mut out = [0i8; 1];
    let mut ov = TensorViewMut::new(Shape4::new(1, 1, 1, 1), &mut out).unwrap();
    conv_per_channel::<Int8Conv, _>(&StripMined::new(16), &params, &half.as_per_channel(), &iv, &fv, None, &mut ov);
    assert_eq!(out, [95]);
}
