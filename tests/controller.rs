// This is free and unencumbered software released into the public domain.

use asimov_camera_control_module::shared::{
    CameraError, CaptureDevice, CaptureRange, ParameterController, ParameterKind,
    drivers::simulated::SimulatedDevice,
};
use std::sync::{Arc, Mutex};

fn controller_with(iso: (f64, f64), exposure: (f64, f64)) -> (Arc<SimulatedDevice>, ParameterController) {
    let device = Arc::new(SimulatedDevice::with_ranges(
        CaptureRange::new(iso.0, iso.1).unwrap(),
        CaptureRange::new(exposure.0, exposure.1).unwrap(),
    ));
    let controller = ParameterController::new(Arc::clone(&device) as Arc<dyn CaptureDevice>);
    (device, controller)
}

fn labels_of(controller: &ParameterController, kind: ParameterKind) -> Arc<Mutex<Vec<String>>> {
    let labels = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&labels);
    controller.on_label(kind, move |text| sink.lock().unwrap().push(text.to_string()));
    labels
}

#[test]
fn focus_lands_on_the_nearest_grid_step() {
    let (_, controller) = controller_with((32.0, 3200.0), (0.000_05, 1.0));
    for i in 0..=997 {
        let raw = i as f64 / 997.0;
        let value = controller.set_focus(raw).unwrap();
        let steps = value * 50.0;
        assert!((steps - steps.round()).abs() < 1e-9, "{raw} -> {value}");
        assert!((value - raw).abs() <= 0.01 + 1e-9, "{raw} -> {value}");
    }
}

#[test]
fn iso_inside_the_range_is_unchanged_and_outside_is_clamped() {
    let (_, controller) = controller_with((32.0, 3200.0), (0.000_05, 1.0));
    for raw in [32.0, 50.5, 100.0, 799.0, 3199.9, 3200.0] {
        assert_eq!(controller.set_iso(raw).unwrap(), raw);
    }
    assert_eq!(controller.set_iso(-5.0).unwrap(), 32.0);
    assert_eq!(controller.set_iso(31.9).unwrap(), 32.0);
    assert_eq!(controller.set_iso(1e6).unwrap(), 3200.0);
}

#[test]
fn iso_scenario_labels() {
    let (device, controller) = controller_with((32.0, 3200.0), (0.000_05, 1.0));
    let labels = labels_of(&controller, ParameterKind::Iso);

    assert_eq!(controller.set_iso(3200.0).unwrap(), 3200.0);
    assert_eq!(controller.set_iso(4000.0).unwrap(), 3200.0);
    assert_eq!(device.current_value(ParameterKind::Iso), 3200.0);
    assert_eq!(*labels.lock().unwrap(), vec!["3200", "3200"]);
}

#[test]
fn focus_scenario_and_idempotence() {
    let (_, controller) = controller_with((32.0, 3200.0), (0.000_05, 1.0));
    let labels = labels_of(&controller, ParameterKind::FocusPosition);

    assert!((controller.set_focus(0.53).unwrap() - 0.54).abs() < 1e-12);
    controller.set_focus(0.5).unwrap();
    controller.set_focus(0.5).unwrap();
    assert_eq!(*labels.lock().unwrap(), vec!["0.54", "0.50", "0.50"]);
}

#[test]
fn derived_exposure_range_for_realistic_devices() {
    for maximum in [0.021, 0.05, 0.125, 0.5, 1.0, 8.0, 30.0] {
        let (_, controller) = controller_with((32.0, 3200.0), (0.000_014, maximum));
        let range = controller.exposure_range();
        if maximum / 200.0 > 0.000_014 + 0.0001 {
            assert!((range.minimum - (0.000_014 + 0.0001)).abs() < 1e-12);
            assert!((range.maximum - maximum / 200.0).abs() < 1e-12);
            assert!(range.minimum < range.maximum);
        } else {
            assert!(range.is_degenerate());
        }
    }
}

#[test]
fn exposure_scenario_label() {
    let (device, controller) = controller_with((32.0, 3200.0), (0.000_05, 1.0));
    let labels = labels_of(&controller, ParameterKind::ExposureDuration);

    let range = controller.exposure_range();
    assert!((range.minimum - 0.000_15).abs() < 1e-12);
    assert!((range.maximum - 0.005).abs() < 1e-12);

    controller.set_exposure_duration(0.002).unwrap();
    assert_eq!(*labels.lock().unwrap(), vec!["2.00 ms"]);
    assert!((device.current_value(ParameterKind::ExposureDuration) - 0.002).abs() < 1e-9);
}

#[test]
fn lock_failures_are_returned_and_publish_nothing() {
    let (device, controller) = controller_with((32.0, 3200.0), (0.000_05, 1.0));
    let labels = labels_of(&controller, ParameterKind::Iso);
    device.fail_configuration_locks(true);

    for kind in ParameterKind::ALL {
        let err = controller.set(kind, 0.5).unwrap_err();
        assert!(matches!(err, CameraError::ConfigurationLock(_)), "{kind}: {err}");
    }
    assert!(labels.lock().unwrap().is_empty());
    assert_eq!(device.lock_count(), 0);
}
