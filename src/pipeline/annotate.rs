use std::collections::HashMap;

use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;

use super::association::VehicleGroup;
use super::backends::{BBox, DetClass};

// BGR palette, one color per class.
const VEHICLE_COLOR: (f64, f64, f64) = (0.0, 255.0, 0.0);
const HELMET_COLOR: (f64, f64, f64) = (255.0, 0.0, 0.0);
const NO_HELMET_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0);
const PLATE_COLOR: (f64, f64, f64) = (0.0, 255.0, 255.0);

fn scalar((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.0)
}

fn rect(bbox: &BBox) -> Rect {
    Rect::new(
        bbox.x1 as i32,
        bbox.y1 as i32,
        bbox.width().max(0.0) as i32,
        bbox.height().max(0.0) as i32,
    )
}

fn label(frame: &mut Mat, text: &str, x: i32, y: i32, color: Scalar) -> opencv::Result<()> {
    imgproc::put_text(
        frame,
        text,
        Point::new(x, y),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        color,
        2,
        imgproc::LINE_AA,
        false,
    )
}

/// Draw vehicle and accessory boxes plus any recognized plate text onto the
/// frame.
pub fn draw_groups(
    frame: &mut Mat,
    groups: &[VehicleGroup],
    plate_texts: &HashMap<u64, (String, f32)>,
) -> opencv::Result<()> {
    for group in groups {
        let vehicle_color = scalar(VEHICLE_COLOR);
        imgproc::rectangle(frame, rect(&group.bbox), vehicle_color, 1, imgproc::LINE_8, 0)?;
        label(
            frame,
            &format!("Vehicle {}", group.track_id),
            group.bbox.x1 as i32,
            group.bbox.y1 as i32 - 10,
            vehicle_color,
        )?;

        for det in &group.accessories {
            let (color, text) = match det.class {
                DetClass::Helmet => (
                    scalar(HELMET_COLOR),
                    format!("Helmet ({:.2})", det.confidence),
                ),
                DetClass::NoHelmet => (
                    scalar(NO_HELMET_COLOR),
                    format!("No Helmet ({:.2})", det.confidence),
                ),
                DetClass::LicensePlate => {
                    let text = match plate_texts.get(&group.track_id) {
                        Some((plate, conf)) => {
                            format!("Plate: {} ({:.2})", plate.replace('\n', " "), conf)
                        }
                        None => format!("Plate ({:.2})", det.confidence),
                    };
                    (scalar(PLATE_COLOR), text)
                }
                DetClass::Vehicle => continue,
            };
            imgproc::rectangle(frame, rect(&det.bbox), color, 1, imgproc::LINE_8, 0)?;
            label(frame, &text, det.bbox.x1 as i32, det.bbox.y1 as i32 - 5, color)?;
        }
    }
    Ok(())
}
