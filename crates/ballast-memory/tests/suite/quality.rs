use ballast_memory::{
    determine_level, PressureLevel, QualityInputs, QualityLevel, TextureQuality, ThermalLevel,
};
use proptest::prelude::*;

fn inputs(thermal: ThermalLevel, battery_fraction: f32, low_power: bool, low_end: bool) -> QualityInputs {
    QualityInputs {
        pressure: PressureLevel::Normal,
        thermal,
        battery_fraction,
        low_power,
        low_end,
    }
}

#[test]
fn nominal_and_charged_is_high() {
    let level = determine_level(&inputs(ThermalLevel::Nominal, 0.9, false, false));
    assert_eq!(level, QualityLevel::High);
    assert_eq!(level.settings().texture_quality, TextureQuality::High);
}

#[test]
fn low_battery_overrides_thermal() {
    assert_eq!(
        determine_level(&inputs(ThermalLevel::Nominal, 0.15, false, false)),
        QualityLevel::Low
    );
}

#[test]
fn serious_thermal_is_low() {
    assert_eq!(
        determine_level(&inputs(ThermalLevel::Serious, 0.9, false, false)),
        QualityLevel::Low
    );
}

#[test]
fn low_end_device_is_medium() {
    assert_eq!(
        determine_level(&inputs(ThermalLevel::Nominal, 0.9, false, true)),
        QualityLevel::Medium
    );
}

#[test]
fn low_power_mode_is_low() {
    assert_eq!(
        determine_level(&inputs(ThermalLevel::Nominal, 0.9, true, false)),
        QualityLevel::Low
    );
}

fn thermal() -> impl Strategy<Value = ThermalLevel> {
    prop_oneof![
        Just(ThermalLevel::Nominal),
        Just(ThermalLevel::Fair),
        Just(ThermalLevel::Serious),
        Just(ThermalLevel::Critical),
    ]
}

fn pressure() -> impl Strategy<Value = PressureLevel> {
    prop_oneof![
        Just(PressureLevel::Normal),
        Just(PressureLevel::Warning),
        Just(PressureLevel::Critical),
        Just(PressureLevel::Extreme),
    ]
}

proptest! {
    #[test]
    fn nearly_empty_battery_is_always_minimal(
        thermal in thermal(),
        pressure in pressure(),
        battery in 0.0f32..0.0999,
        low_power in any::<bool>(),
        low_end in any::<bool>(),
    ) {
        let level = determine_level(&QualityInputs {
            pressure,
            thermal,
            battery_fraction: battery,
            low_power,
            low_end,
        });
        prop_assert_eq!(level, QualityLevel::Minimal);
    }

    #[test]
    fn clamps_never_exceed_the_thermal_level(
        thermal in thermal(),
        pressure in pressure(),
        battery in 0.0f32..=1.0,
        low_power in any::<bool>(),
        low_end in any::<bool>(),
    ) {
        let level = determine_level(&QualityInputs {
            pressure,
            thermal,
            battery_fraction: battery,
            low_power,
            low_end,
        });
        prop_assert!(level <= QualityLevel::for_thermal(thermal));
        prop_assert!(level < QualityLevel::Ultra);
    }
}
