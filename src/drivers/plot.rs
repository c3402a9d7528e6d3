use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::error::PlotError;
use crate::types::SampleSequence;

pub const X_LABEL: &str = "Elapsed ticks";
pub const Y_LABEL: &str = "Voltage (V)";

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub foreground: RGBColor,
    pub line: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(240, 240, 240),
            foreground: RGBColor(60, 60, 60),
            line: RGBColor(0, 143, 213),
        }
    }
}

/// Renders the sequence against its tick axis and encodes it as PNG.
///
/// An empty sequence still yields a framed, empty chart. Hosts without a
/// usable sans-serif font get the chart without any text.
pub fn render_trial_png(
    samples: &SampleSequence,
    tick_count: usize,
    caption: &str,
    style: &PlotStyle,
) -> Result<Vec<u8>, PlotError> {
    if style.width == 0 || style.height == 0 {
        return Err(PlotError::Render("plot area has zero size".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    if let Err(e) = draw_chart(&mut buffer, samples, tick_count, Some(caption), style) {
        log::warn!("labelled plot failed ({e}); drawing without text");
        buffer.fill(0);
        draw_chart(&mut buffer, samples, tick_count, None, style)?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn draw_chart(
    buffer: &mut [u8],
    samples: &SampleSequence,
    tick_count: usize,
    caption: Option<&str>,
    style: &PlotStyle,
) -> Result<(), PlotError> {
    let root = BitMapBackend::with_buffer(buffer, (style.width, style.height)).into_drawing_area();
    root.fill(&style.background)?;
    let (y_min, y_max) = value_bounds(samples);
    let x_max = tick_count.max(samples.last().map_or(0, |s| s.tick + 1)).max(1) as f64;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if let Some(caption) = caption {
        builder
            .caption(caption, ("sans-serif", 20).into_font().color(&style.foreground))
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 45);
    }
    let mut chart = builder.build_cartesian_2d(0f64..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    mesh.light_line_style(&style.foreground.mix(0.1));
    if caption.is_some() {
        mesh.x_desc(X_LABEL)
            .y_desc(Y_LABEL)
            .axis_desc_style(("sans-serif", 15).into_font().color(&style.foreground))
            .label_style(("sans-serif", 12).into_font().color(&style.foreground));
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;
    for run in samples.runs() {
        let series = run.into_iter().map(|[x, y]| (x, y));
        chart.draw_series(LineSeries::new(series, style.line.stroke_width(2)))?;
    }
    root.present()?;
    Ok(())
}

fn value_bounds(samples: &SampleSequence) -> (f64, f64) {
    let finite = samples.iter().map(|s| s.value).filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    // Avoid a zero-height axis.
    let pad = ((max - min) * 0.1).max(0.1);
    (min - pad, max + pad)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PlotError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| PlotError::Render("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG";

    #[test]
    fn renders_png_with_gaps() {
        let mut samples = SampleSequence::default();
        samples.push(0, 1.0);
        samples.push(1, 1.5);
        samples.push(4, 0.5);
        let png = render_trial_png(&samples, 10, "1-ana-grip", &PlotStyle::default()).unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[test]
    fn empty_sequence_still_renders() {
        let png =
            render_trial_png(&SampleSequence::default(), 0, "empty", &PlotStyle::default()).unwrap();
        assert!(png.starts_with(PNG_MAGIC));
    }

    #[test]
    fn flat_signal_gets_padded_bounds() {
        let mut samples = SampleSequence::default();
        samples.push(0, 2.0);
        samples.push(1, 2.0);
        let (lo, hi) = value_bounds(&samples);
        assert!(lo < 2.0 && hi > 2.0);
    }

    #[test]
    fn zero_sized_style_is_rejected() {
        let style = PlotStyle {
            width: 0,
            ..PlotStyle::default()
        };
        assert!(render_trial_png(&SampleSequence::default(), 1, "x", &style).is_err());
    }
}
