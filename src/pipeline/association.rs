use ndarray::{Array2, Zip};

use super::backends::{BBox, DetClass, Detection, TrackedVehicle};

/// Minimum containment-in-parent ratio for any accessory.
const CIP_MIN: f32 = 0.947;
/// Helmets sit in the top band of the vehicle box.
const HELMET_BAND: (f32, f32) = (0.0, 0.29);
/// Plates sit in the bottom band.
const PLATE_BAND: (f32, f32) = (0.64, 1.0);

/// Vehicles are scored against accessories in fixed-size batches.
const VEHICLE_BATCH: usize = 32;

/// A tracked vehicle with its validated accessories.
#[derive(Debug, Clone)]
pub struct VehicleGroup {
    pub track_id: u64,
    pub bbox: BBox,
    pub accessories: Vec<Detection>,
    pub max_no_helmet_conf: f32,
}

impl VehicleGroup {
    pub fn has_no_helmet(&self) -> bool {
        self.accessories.iter().any(|d| d.class == DetClass::NoHelmet)
    }

    /// Highest-confidence license plate among the validated accessories.
    pub fn best_plate(&self) -> Option<&Detection> {
        self.accessories
            .iter()
            .filter(|d| d.class == DetClass::LicensePlate)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

/// Containment-in-parent: intersection area over accessory area, in [0,1].
pub fn cip(vehicle: &BBox, accessory: &BBox) -> f32 {
    let accessory_area = accessory.area();
    if accessory_area > 0.0 {
        (vehicle.intersection_area(accessory) / accessory_area).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Height-band position: normalized vertical position of the accessory
/// center within the vehicle box.
pub fn hhb(vehicle: &BBox, accessory: &BBox) -> f32 {
    let vehicle_height = vehicle.height();
    if vehicle_height > 0.0 {
        (accessory.center_y() - vehicle.y1) / vehicle_height
    } else {
        0.0
    }
}

pub fn accessory_valid(class: DetClass, cip: f32, hhb: f32) -> bool {
    match class {
        DetClass::Helmet | DetClass::NoHelmet => {
            cip > CIP_MIN && hhb >= HELMET_BAND.0 && hhb <= HELMET_BAND.1
        }
        DetClass::LicensePlate => cip > CIP_MIN && hhb >= PLATE_BAND.0 && hhb <= PLATE_BAND.1,
        _ => false,
    }
}

/// All pairwise CIP/HHB scores for one vehicle batch, as two [batch, m]
/// arrays filled in a single pass.
fn pairwise_scores(vehicles: &[BBox], accessories: &[BBox]) -> (Array2<f32>, Array2<f32>) {
    let shape = (vehicles.len(), accessories.len());
    let mut cips = Array2::<f32>::zeros(shape);
    let mut hhbs = Array2::<f32>::zeros(shape);
    Zip::indexed(&mut cips).and(&mut hhbs).for_each(|(i, j), c, h| {
        *c = cip(&vehicles[i], &accessories[j]);
        *h = hhb(&vehicles[i], &accessories[j]);
    });
    (cips, hhbs)
}

/// Group non-vehicle detections under the tracked vehicles that contain
/// them. Scoring always runs in the original detection coordinate space.
pub fn group(vehicles: &[TrackedVehicle], accessories: &[Detection]) -> Vec<VehicleGroup> {
    let accessory_boxes: Vec<BBox> = accessories.iter().map(|d| d.bbox).collect();
    let mut groups = Vec::with_capacity(vehicles.len());

    for chunk in vehicles.chunks(VEHICLE_BATCH) {
        let vehicle_boxes: Vec<BBox> = chunk.iter().map(|v| v.bbox).collect();
        let (cips, hhbs) = pairwise_scores(&vehicle_boxes, &accessory_boxes);

        for (i, vehicle) in chunk.iter().enumerate() {
            let mut kept = Vec::new();
            let mut max_no_helmet_conf = 0.0f32;
            for (j, det) in accessories.iter().enumerate() {
                if accessory_valid(det.class, cips[[i, j]], hhbs[[i, j]]) {
                    if det.class == DetClass::NoHelmet {
                        max_no_helmet_conf = max_no_helmet_conf.max(det.confidence);
                    }
                    kept.push(det.clone());
                }
            }
            groups.push(VehicleGroup {
                track_id: vehicle.track_id,
                bbox: vehicle.bbox,
                accessories: kept,
                max_no_helmet_conf,
            });
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: DetClass, bbox: BBox, confidence: f32) -> Detection {
        Detection {
            class,
            bbox,
            confidence,
        }
    }

    #[test]
    fn cip_is_clamped_to_unit_range() {
        let vehicle = BBox::new(0.0, 0.0, 100.0, 100.0);
        let inside = BBox::new(10.0, 10.0, 20.0, 20.0);
        let disjoint = BBox::new(200.0, 200.0, 210.0, 210.0);
        let degenerate = BBox::new(5.0, 5.0, 5.0, 5.0);

        assert_eq!(cip(&vehicle, &inside), 1.0);
        assert_eq!(cip(&vehicle, &disjoint), 0.0);
        assert_eq!(cip(&vehicle, &degenerate), 0.0);

        let half_out = BBox::new(90.0, 0.0, 110.0, 10.0);
        let value = cip(&vehicle, &half_out);
        assert!(value > 0.0 && value < 1.0);
    }

    #[test]
    fn hhb_is_relative_to_vehicle_height() {
        let vehicle = BBox::new(0.0, 0.0, 50.0, 100.0);
        // Accessory centered at y = 29 over height 100.
        let accessory = BBox::new(0.0, 19.0, 10.0, 39.0);
        assert_eq!(hhb(&vehicle, &accessory), 0.29);

        let flat_vehicle = BBox::new(0.0, 10.0, 50.0, 10.0);
        assert_eq!(hhb(&flat_vehicle, &accessory), 0.0);
    }

    #[test]
    fn helmet_band_boundaries() {
        assert!(accessory_valid(DetClass::Helmet, 0.95, 0.29));
        assert!(!accessory_valid(DetClass::Helmet, 0.95, 0.2901));
        assert!(accessory_valid(DetClass::NoHelmet, 0.95, 0.0));
        assert!(!accessory_valid(DetClass::NoHelmet, 0.95, -0.01));
        assert!(!accessory_valid(DetClass::NoHelmet, 0.947, 0.1));
    }

    #[test]
    fn plate_band_boundaries() {
        assert!(accessory_valid(DetClass::LicensePlate, 0.95, 0.64));
        assert!(!accessory_valid(DetClass::LicensePlate, 0.95, 0.639));
        assert!(accessory_valid(DetClass::LicensePlate, 0.95, 1.0));
        assert!(!accessory_valid(DetClass::LicensePlate, 0.95, 1.001));
    }

    #[test]
    fn vehicle_class_is_never_a_valid_accessory() {
        assert!(!accessory_valid(DetClass::Vehicle, 1.0, 0.1));
    }

    #[test]
    fn groups_accessories_by_band() {
        let vehicles = vec![TrackedVehicle {
            track_id: 7,
            bbox: BBox::new(0.0, 0.0, 100.0, 200.0),
        }];
        let accessories = vec![
            // Head region, fully contained.
            det(DetClass::NoHelmet, BBox::new(30.0, 10.0, 60.0, 40.0), 0.91),
            // Plate region, fully contained.
            det(DetClass::LicensePlate, BBox::new(30.0, 150.0, 70.0, 180.0), 0.77),
            // Plate box floating in the head band: rejected.
            det(DetClass::LicensePlate, BBox::new(30.0, 10.0, 70.0, 40.0), 0.99),
            // Helmet mostly outside the vehicle: rejected on CIP.
            det(DetClass::Helmet, BBox::new(80.0, 10.0, 140.0, 40.0), 0.88),
        ];

        let groups = group(&vehicles, &accessories);
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.track_id, 7);
        assert_eq!(g.accessories.len(), 2);
        assert!(g.has_no_helmet());
        assert_eq!(g.max_no_helmet_conf, 0.91);
        assert_eq!(g.best_plate().unwrap().confidence, 0.77);
    }

    #[test]
    fn batched_evaluation_matches_scalar_path() {
        // More vehicles than one batch to force chunking.
        let vehicles: Vec<TrackedVehicle> = (0..70)
            .map(|i| {
                let off = i as f32 * 13.0;
                TrackedVehicle {
                    track_id: i,
                    bbox: BBox::new(off, 0.0, off + 50.0, 120.0),
                }
            })
            .collect();
        let accessories: Vec<Detection> = (0..40)
            .map(|j| {
                let off = j as f32 * 23.0;
                let class = if j % 2 == 0 {
                    DetClass::NoHelmet
                } else {
                    DetClass::LicensePlate
                };
                det(class, BBox::new(off, 5.0 + off % 90.0, off + 20.0, 25.0 + off % 90.0), 0.5)
            })
            .collect();

        let groups = group(&vehicles, &accessories);
        assert_eq!(groups.len(), vehicles.len());

        for (g, vehicle) in groups.iter().zip(&vehicles) {
            let expected: Vec<bool> = accessories
                .iter()
                .map(|d| {
                    accessory_valid(
                        d.class,
                        cip(&vehicle.bbox, &d.bbox),
                        hhb(&vehicle.bbox, &d.bbox),
                    )
                })
                .collect();
            let expected_count = expected.iter().filter(|v| **v).count();
            assert_eq!(g.accessories.len(), expected_count);
        }
    }

    #[test]
    fn no_accessories_yields_empty_groups() {
        let vehicles = vec![TrackedVehicle {
            track_id: 1,
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
        }];
        let groups = group(&vehicles, &[]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].accessories.is_empty());
        assert_eq!(groups[0].max_no_helmet_conf, 0.0);
    }
}
