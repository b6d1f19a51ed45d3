use super::CameraProfile;
use crate::lens::DistortionModelKind;
use crate::Real;

struct Entry {
    name: &'static str,
    manufacturer: &'static str,
    model: &'static str,
    sensor: (Real, Real),
    focal_length: Real,
    crop_factor: Real,
    k: [Real; 3],
    p: [Real; 2],
}

const CATALOG: &[Entry] = &[
    // Phones
    Entry {
        name: "iphone_15_pro_main",
        manufacturer: "Apple",
        model: "iPhone 15 Pro (main 24mm)",
        sensor: (9.8, 7.3),
        focal_length: 6.86,
        crop_factor: 3.5,
        k: [-0.042, 0.011, 0.0],
        p: [0.0002, -0.0001],
    },
    Entry {
        name: "iphone_15_pro_ultrawide",
        manufacturer: "Apple",
        model: "iPhone 15 Pro (ultra wide 13mm)",
        sensor: (5.6, 4.2),
        focal_length: 2.22,
        crop_factor: 6.1,
        k: [-0.19, 0.046, -0.004],
        p: [0.0005, 0.0003],
    },
    Entry {
        name: "iphone_15_pro_telephoto",
        manufacturer: "Apple",
        model: "iPhone 15 Pro (telephoto 77mm)",
        sensor: (4.0, 3.0),
        focal_length: 9.0,
        crop_factor: 8.6,
        k: [0.012, -0.003, 0.0],
        p: [0.0, 0.0],
    },
    Entry {
        name: "iphone_14_main",
        manufacturer: "Apple",
        model: "iPhone 14 (main 26mm)",
        sensor: (7.6, 5.7),
        focal_length: 5.7,
        crop_factor: 4.6,
        k: [-0.05, 0.014, 0.0],
        p: [0.0002, 0.0],
    },
    Entry {
        name: "pixel_8_pro_main",
        manufacturer: "Google",
        model: "Pixel 8 Pro (main 25mm)",
        sensor: (9.6, 7.2),
        focal_length: 6.9,
        crop_factor: 3.6,
        k: [-0.048, 0.013, 0.0],
        p: [0.0001, 0.0001],
    },
    // Cinema
    Entry {
        name: "arri_alexa_mini_lf",
        manufacturer: "ARRI",
        model: "Alexa Mini LF",
        sensor: (36.70, 25.54),
        focal_length: 35.0,
        crop_factor: 0.98,
        k: [-0.015, 0.002, 0.0],
        p: [0.0, 0.0],
    },
    Entry {
        name: "red_komodo_6k",
        manufacturer: "RED",
        model: "Komodo 6K",
        sensor: (27.03, 14.26),
        focal_length: 35.0,
        crop_factor: 1.33,
        k: [-0.02, 0.003, 0.0],
        p: [0.0, 0.0],
    },
    Entry {
        name: "blackmagic_pocket_6k",
        manufacturer: "Blackmagic Design",
        model: "Pocket Cinema Camera 6K",
        sensor: (23.10, 12.99),
        focal_length: 25.0,
        crop_factor: 1.56,
        k: [-0.025, 0.004, 0.0],
        p: [0.0, 0.0],
    },
    Entry {
        name: "sony_fx3",
        manufacturer: "Sony",
        model: "FX3",
        sensor: (35.6, 23.8),
        focal_length: 24.0,
        crop_factor: 1.0,
        k: [-0.03, 0.005, 0.0],
        p: [0.0, 0.0],
    },
    // Action
    Entry {
        name: "gopro_hero12_wide",
        manufacturer: "GoPro",
        model: "HERO12 Black (Wide)",
        sensor: (6.17, 4.55),
        focal_length: 2.92,
        crop_factor: 5.6,
        k: [-0.27, 0.083, -0.011],
        p: [0.0004, -0.0002],
    },
    Entry {
        name: "gopro_hero12_linear",
        manufacturer: "GoPro",
        model: "HERO12 Black (Linear)",
        sensor: (6.17, 4.55),
        focal_length: 2.92,
        crop_factor: 5.6,
        k: [-0.02, 0.004, 0.0],
        p: [0.0, 0.0],
    },
    Entry {
        name: "dji_osmo_action_4",
        manufacturer: "DJI",
        model: "Osmo Action 4",
        sensor: (7.4, 5.55),
        focal_length: 2.51,
        crop_factor: 4.8,
        k: [-0.24, 0.07, -0.009],
        p: [0.0003, 0.0002],
    },
];

/// The built-in catalog: phone, cinema and action cameras plus a
/// zero-distortion `generic` profile.
pub fn builtin_profiles() -> Vec<CameraProfile> {
    let mut profiles: Vec<CameraProfile> = CATALOG
        .iter()
        .map(|e| CameraProfile {
            name: e.name.to_string(),
            manufacturer: e.manufacturer.to_string(),
            model: e.model.to_string(),
            sensor_width: e.sensor.0,
            sensor_height: e.sensor.1,
            focal_length: e.focal_length,
            crop_factor: e.crop_factor,
            distortion_model: DistortionModelKind::BrownConrady,
            k1: e.k[0],
            k2: e.k[1],
            k3: e.k[2],
            p1: e.p[0],
            p2: e.p[1],
            cx: 0.0,
            cy: 0.0,
        })
        .collect();

    profiles.push(CameraProfile {
        name: "generic".to_string(),
        manufacturer: "Generic".to_string(),
        model: "Full frame, no distortion".to_string(),
        distortion_model: DistortionModelKind::None,
        ..CameraProfile::default()
    });
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique_lowercase() {
        let profiles = builtin_profiles();
        let names: HashSet<_> = profiles.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names.len(), profiles.len());
        assert!(profiles.iter().all(|p| p.name == p.name.to_lowercase()));
    }

    #[test]
    fn generic_has_no_distortion() {
        let profiles = builtin_profiles();
        let generic = profiles.iter().find(|p| p.name == "generic").unwrap();
        assert!(!generic.has_distortion());
        assert!(profiles.iter().filter(|p| p.name != "generic").all(|p| p.has_distortion()));
    }
}
