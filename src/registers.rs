/// One of the four Modbus address spaces.
///
/// The declaration order is the order in which the catalog is sorted and in which reads are
/// planned.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
    clap::ValueEnum,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum RegionKind {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

impl RegionKind {
    // Convenience aliases for nicely tabulated `for_each_register` macro definition below.
    const COIL: Self = Self::Coil;
    const DINP: Self = Self::DiscreteInput;
    const INPT: Self = Self::InputRegister;
    const HOLD: Self = Self::HoldingRegister;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, strum::Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    Boolean,
    Signed16,
    Unsigned16,
    /// Two consecutive words, high word first.
    Wide32,
    /// A small code mapped onto [`crate::codec::Status`].
    Status,
}

impl DataType {
    const BIT: Self = Self::Boolean;
    const I16: Self = Self::Signed16;
    const U16: Self = Self::Unsigned16;
    const U32: Self = Self::Wide32;
    const STS: Self = Self::Status;

    /// Number of consecutive addresses a value of this type occupies.
    pub const fn words(self) -> u16 {
        match self {
            Self::Wide32 => 2,
            Self::Boolean | Self::Signed16 | Self::Unsigned16 | Self::Status => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Mode(u8);

impl serde::Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0 & Self::R.0 == 0 { "-" } else { "R" })?;
        f.write_str(if self.0 & Self::W.0 == 0 { "-" } else { "W" })?;
        Ok(())
    }
}

impl Mode {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);
    const R_: Self = Self::R;

    pub const fn is_writable(self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

/// The heat pump variants the catalog knows about.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Thermia Diplomat Inverter.
    #[default]
    Inverter,
    /// Thermia Mega.
    Mega,
}

impl Model {
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Inverter => "Diplomat Inverter",
            Self::Mega => "Mega",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Set of models a register is exposed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Models(u8);

impl Models {
    pub const INVERTER: Self = Self(1 << 0);
    pub const MEGA: Self = Self(1 << 1);
    pub const ALL: Self = Self(Self::INVERTER.0 | Self::MEGA.0);
    const IM: Self = Self::ALL;
    const I_: Self = Self::INVERTER;
    const _M: Self = Self::MEGA;

    pub const fn contains(self, model: Model) -> bool {
        let bit = match model {
            Model::Inverter => Self::INVERTER.0,
            Model::Mega => Self::MEGA.0,
        };
        self.0 & bit != 0
    }
}

impl std::fmt::Display for Models {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.contains(Model::Inverter) { "I" } else { "-" })?;
        f.write_str(if self.contains(Model::Mega) { "M" } else { "-" })?;
        Ok(())
    }
}

impl serde::Serialize for Models {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq as _;
        let mut seq = serializer.serialize_seq(None)?;
        for model in <Model as strum::IntoEnumIterator>::iter() {
            if self.contains(model) {
                seq.serialize_element(&model)?;
            }
        }
        seq.end()
    }
}

/// Another register whose value decides whether this one may be read at all.
///
/// Reading a gated register while its gate does not hold makes the device respond with an
/// exception.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Gate {
    pub register: &'static str,
    pub required: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Descriptor {
    pub name: &'static str,
    pub kind: RegionKind,
    pub address: u16,
    pub data_type: DataType,
    /// Raw values are this many times larger than the value they represent.
    pub scale: u16,
    pub mode: Mode,
    pub models: Models,
    pub gate: Option<Gate>,
}

impl Descriptor {
    /// A read-only, unscaled register exposed by all models.
    pub const fn new(
        kind: RegionKind,
        address: u16,
        name: &'static str,
        data_type: DataType,
    ) -> Self {
        Self {
            name,
            kind,
            address,
            data_type,
            scale: 1,
            mode: Mode::R,
            models: Models::ALL,
            gate: None,
        }
    }

    pub const fn scaled(mut self, scale: u16) -> Self {
        self.scale = scale;
        self
    }

    pub const fn writable(mut self) -> Self {
        self.mode = Mode::RW;
        self
    }

    pub const fn only(mut self, models: Models) -> Self {
        self.models = models;
        self
    }

    pub const fn gated_by(mut self, register: &'static str, required: bool) -> Self {
        self.gate = Some(Gate { register, required });
        self
    }

    /// The last address occupied by this register's value.
    pub const fn last_address(&self) -> u16 {
        self.address.saturating_add(self.data_type.words() - 1)
    }

    pub const fn is_applicable(&self, model: Model) -> bool {
        self.models.contains(model)
    }

    pub const fn sort_key(&self) -> (RegionKind, u16) {
        (self.kind, self.address)
    }
}

/// An inclusive block of addresses that the device answers reads for.
///
/// Reads that extend past the end of a block into undefined addresses are rejected by the
/// device, so a single read request never spans two blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ValidRange {
    pub kind: RegionKind,
    pub start: u16,
    pub end: u16,
}

impl ValidRange {
    pub const fn new(kind: RegionKind, start: u16, end: u16) -> Self {
        Self { kind, start, end }
    }

    pub const fn contains(&self, kind: RegionKind, first: u16, last: u16) -> bool {
        self.kind as u8 == kind as u8 && self.start <= first && last <= self.end
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("register `{0}` is not known")]
    UnknownRegister(String),
}

/// The register table together with the address blocks each model answers for.
#[derive(Clone, Copy, Debug)]
pub struct Catalog {
    registers: &'static [Descriptor],
    inverter_ranges: &'static [ValidRange],
    mega_ranges: &'static [ValidRange],
}

impl Catalog {
    /// The Thermia Genesis register map.
    pub const GENESIS: Self = Self::new(REGISTERS, INVERTER_RANGES, MEGA_RANGES);

    pub const fn new(
        registers: &'static [Descriptor],
        inverter_ranges: &'static [ValidRange],
        mega_ranges: &'static [ValidRange],
    ) -> Self {
        Self { registers, inverter_ranges, mega_ranges }
    }

    pub fn registers(&self) -> &'static [Descriptor] {
        self.registers
    }

    pub fn lookup(&self, name: &str) -> Result<&'static Descriptor, Error> {
        self.registers
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::UnknownRegister(name.to_string()))
    }

    /// Look up every name, then sort by region kind and address and drop duplicates.
    pub fn resolve<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<Vec<&'static Descriptor>, Error> {
        let mut result = names
            .into_iter()
            .map(|name| self.lookup(name))
            .collect::<Result<Vec<_>, _>>()?;
        result.sort_by_key(|d| (d.sort_key(), d.name));
        result.dedup_by_key(|d| d.name);
        Ok(result)
    }

    pub fn all_applicable(
        &self,
        model: Model,
    ) -> impl Iterator<Item = &'static Descriptor> + use<> {
        let registers = self.registers;
        registers.iter().filter(move |d| d.is_applicable(model))
    }

    pub fn of_kinds<'k>(
        &self,
        model: Model,
        kinds: &'k [RegionKind],
    ) -> impl Iterator<Item = &'static Descriptor> + use<'k> {
        self.all_applicable(model).filter(|d| kinds.contains(&d.kind))
    }

    pub fn valid_ranges(&self, model: Model) -> &'static [ValidRange] {
        match model {
            Model::Inverter => self.inverter_ranges,
            Model::Mega => self.mega_ranges,
        }
    }

    pub fn range_containing(
        &self,
        model: Model,
        kind: RegionKind,
        first: u16,
        last: u16,
    ) -> Option<&'static ValidRange> {
        self.valid_ranges(model).iter().find(|r| r.contains(kind, first, last))
    }
}

macro_rules! for_each_register {
    ($m:ident) => {
        $m! {
            COIL 3: BIT, RW, IM, "coil_reset_all_alarms";
            COIL 4: BIT, RW, IM, "coil_enable_internal_additional_heater";
            COIL 5: BIT, RW, IM, "coil_enable_external_additional_heater";
            COIL 6: BIT, RW, IM, "coil_enable_hgw";
            COIL 7: BIT, RW, IM, "coil_enable_flow_switch_pressure_switch";
            COIL 8: BIT, RW, IM, "coil_enable_tap_water";
            COIL 9: BIT, RW, IM, "coil_enable_heat";
            COIL 10: BIT, RW, IM, "coil_enable_active_cooling";
            COIL 11: BIT, RW, IM, "coil_enable_mix_valve_1";
            COIL 12: BIT, RW, IM, "coil_enable_twc";
            COIL 13: BIT, RW, IM, "coil_enable_wcs";
            COIL 14: BIT, RW, IM, "coil_enable_hot_gas_pump";
            COIL 16: BIT, RW, IM, "coil_enable_mix_valve_2";
            COIL 17: BIT, RW, IM, "coil_enable_mix_valve_3";
            COIL 18: BIT, RW, IM, "coil_enable_mix_valve_4";
            COIL 19: BIT, RW, IM, "coil_enable_mix_valve_5";
            COIL 20: BIT, RW, IM, "coil_enable_brine_out_monitoring";
            COIL 21: BIT, RW, IM, "coil_enable_brine_pump_continuous_operation";
            COIL 22: BIT, RW, IM, "coil_enable_system_circulation_pump";
            COIL 23: BIT, RW, IM, "coil_enable_dew_point_calculation";
            COIL 24: BIT, RW, IM, "coil_enable_anti_legionella";
            COIL 25: BIT, RW, IM, "coil_enable_additional_heater_only";
            COIL 26: BIT, RW, IM, "coil_enable_current_limitation";
            COIL 28: BIT, RW, IM, "coil_enable_pool";
            COIL 29: BIT, RW, _M, "coil_enable_surplus_heat_chiller";
            COIL 30: BIT, RW, _M, "coil_enable_surplus_heat_borehole";
            COIL 31: BIT, RW, IM, "coil_enable_external_additional_heater_for_pool";
            COIL 32: BIT, RW, IM, "coil_enable_internal_additional_heater_for_pool";
            COIL 33: BIT, RW, IM, "coil_enable_passive_cooling";
            COIL 34: BIT, RW, I_, "coil_enable_variable_speed_mode_for_condenser_pump";
            COIL 35: BIT, RW, I_, "coil_enable_variable_speed_mode_for_brine_pump";
            COIL 36: BIT, RW, IM, "coil_enable_cooling_mode_for_mixing_valve_1";
            COIL 41: BIT, RW, IM, "coil_enable_brine_in_monitoring";
            COIL 42: BIT, RW, IM, "coil_enable_fixed_system_supply_set_point";
            DINP 0: BIT, R_, IM, "dinput_alarm_active_class_a";
            DINP 1: BIT, R_, IM, "dinput_alarm_active_class_b";
            DINP 2: BIT, R_, IM, "dinput_alarm_active_class_c";
            DINP 3: BIT, R_, IM, "dinput_alarm_active_class_d";
            DINP 4: BIT, R_, IM, "dinput_alarm_active_class_e";
            DINP 9: BIT, R_, IM, "dinput_high_pressure_switch_alarm";
            DINP 10: BIT, R_, IM, "dinput_low_pressure_level_alarm";
            DINP 11: BIT, R_, IM, "dinput_high_discharge_pipe_temperature_alarm";
            DINP 12: BIT, R_, IM, "dinput_operating_pressure_limit_indication";
            DINP 13: BIT, R_, IM, "dinput_discharge_pipe_sensor_alarm";
            DINP 14: BIT, R_, IM, "dinput_liquid_line_sensor_alarm";
            DINP 15: BIT, R_, IM, "dinput_suction_gas_sensor_alarm";
            DINP 16: BIT, R_, IM, "dinput_flow_pressure_switch_alarm";
            DINP 22: BIT, R_, IM, "dinput_power_input_phase_detection_alarm";
            DINP 23: BIT, R_, I_, "dinput_inverter_unit_alarm";
            DINP 24: BIT, R_, IM, "dinput_system_supply_low_temperature_alarm";
            DINP 25: BIT, R_, IM, "dinput_system_supply_high_temperature_alarm";
            DINP 26: BIT, R_, IM, "dinput_brine_out_low_temperature_alarm";
            DINP 27: BIT, R_, IM, "dinput_brine_in_high_temperature_alarm";
            INPT 0: U16, R_, IM, "input_current_error_code";
            INPT 1: I16 / 100, R_, IM, "input_outdoor_temperature";
            INPT 3: I16 / 100, R_, IM, "input_system_supply_line_temperature";
            INPT 4: I16 / 100, R_, IM, "input_discharge_pipe_temperature";
            INPT 5: I16 / 100, R_, IM, "input_liquid_line_temperature";
            INPT 6: I16 / 100, R_, IM, "input_suction_gas_temperature";
            INPT 7: I16 / 100, R_, IM, "input_return_line_temperature";
            INPT 8: I16 / 100, R_, IM, "input_pool_temperature";
            INPT 9: I16 / 100, R_, IM, "input_tap_water_weighted_temperature";
            INPT 10: I16 / 100, R_, IM, "input_brine_in_temperature";
            INPT 11: I16 / 100, R_, IM, "input_brine_out_temperature";
            INPT 12: I16 / 100, R_, IM, "input_tap_water_top_temperature";
            INPT 13: I16 / 100, R_, IM, "input_tap_water_lower_temperature";
            INPT 17: I16 / 100, R_, IM, "input_room_temperature";
            INPT 20: I16 / 100, R_, IM, "input_cooling_tank_temperature";
            INPT 25: STS, R_, IM, "input_status";
            INPT 29: U16 / 100, R_, IM, "input_compressor_speed_percent";
            INPT 30: U16 / 100, R_, I_, "input_condenser_circulation_pump_speed";
            INPT 31: U16 / 100, R_, I_, "input_brine_circulation_pump_speed";
            INPT 32: I16 / 100, R_, IM, "input_calculated_supply_line_temperature";
            INPT 36: I16 / 100, R_, IM, "input_desired_temperature_mix_valve_1";
            INPT 39: I16 / 100, R_, IM, "input_buffer_tank_temperature";
            INPT 41: U16, R_, _M, "input_compressor_available_gears";
            INPT 44: U16, R_, _M, "input_compressor_current_gear";
            INPT 100: U32, R_, IM, "input_compressor_operating_hours";
            INPT 102: U32, R_, IM, "input_tap_water_operating_hours";
            INPT 104: U32, R_, IM, "input_external_additional_heater_operating_hours";
            INPT 107: U16, R_, IM, "input_software_version_major";
            INPT 108: U16, R_, IM, "input_software_version_minor";
            INPT 109: U16, R_, IM, "input_software_version_micro";
            HOLD 0: U16, RW, IM, "holding_operational_mode";
            HOLD 3: I16 / 100, RW, IM, "holding_max_limitation";
            HOLD 4: I16 / 100, RW, IM, "holding_min_limitation";
            HOLD 5: I16 / 100, RW, IM, "holding_comfort_wheel_setting";
            HOLD 6: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_1";
            HOLD 7: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_2";
            HOLD 8: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_3";
            HOLD 9: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_4";
            HOLD 10: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_5";
            HOLD 11: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_6";
            HOLD 12: I16 / 100, RW, IM, "holding_set_point_heat_curve_y_7";
            HOLD 16: I16 / 100, RW, IM, "holding_heat_stop";
            HOLD 22: I16 / 100, RW, IM, "holding_start_temperature_tap_water";
            HOLD 23: I16 / 100, RW, IM, "holding_stop_temperature_tap_water";
            HOLD 26: U16, RW, _M, "holding_minimum_allowed_gear_in_heating";
            HOLD 27: U16, RW, _M, "holding_maximum_allowed_gear_in_heating";
            HOLD 30: I16 / 100, RW, IM, "holding_external_additional_heater_start";
            HOLD 31: I16 / 100, RW, IM, "holding_fixed_system_supply_set_point",
                gate = "coil_enable_fixed_system_supply_set_point" == true;
            HOLD 50: U16, R_, IM, "holding_modbus_slave_address";
        }
    };
}

macro_rules! optional {
    () => {
        None
    };
    ($($lit: tt)+) => {
        Some($($lit)*)
    };
}

macro_rules! scale {
    () => {
        1
    };
    ($scale: literal) => {
        $scale
    };
}

macro_rules! make_table {
    ($(
        $kind: ident $address: literal: $dt: ident $(/ $scale: literal)?, $mode: ident,
        $models: ident, $name: literal $(, gate = $gate: literal == $required: literal)?;
    )+) => {
        pub const REGISTERS: &[Descriptor] = &[$(Descriptor {
            name: $name,
            kind: RegionKind::$kind,
            address: $address,
            data_type: DataType::$dt,
            scale: scale!($($scale)?),
            mode: Mode::$mode,
            models: Models::$models,
            gate: optional!($(Gate { register: $gate, required: $required })?),
        }),+];
    };
}

for_each_register!(make_table);

const _ASSERT_REGISTERS_SORTED: () = const {
    let mut index = 1;
    while index < REGISTERS.len() {
        let previous = &REGISTERS[index - 1];
        let current = &REGISTERS[index];
        let (pk, ck) = (previous.kind as u8, current.kind as u8);
        if pk > ck || (pk == ck && previous.last_address() >= current.address) {
            panic!("REGISTERS is not sorted (or has overlapping registers)!");
        }
        index += 1;
    }
};

pub const INVERTER_RANGES: &[ValidRange] = &[
    ValidRange::new(RegionKind::COIL, 3, 42),
    ValidRange::new(RegionKind::DINP, 0, 4),
    ValidRange::new(RegionKind::DINP, 9, 27),
    ValidRange::new(RegionKind::INPT, 0, 39),
    ValidRange::new(RegionKind::INPT, 100, 109),
    ValidRange::new(RegionKind::HOLD, 0, 23),
    ValidRange::new(RegionKind::HOLD, 30, 31),
    ValidRange::new(RegionKind::HOLD, 50, 50),
];

pub const MEGA_RANGES: &[ValidRange] = &[
    ValidRange::new(RegionKind::COIL, 3, 42),
    ValidRange::new(RegionKind::DINP, 0, 4),
    ValidRange::new(RegionKind::DINP, 9, 27),
    ValidRange::new(RegionKind::INPT, 0, 47),
    ValidRange::new(RegionKind::INPT, 100, 109),
    ValidRange::new(RegionKind::HOLD, 0, 31),
    ValidRange::new(RegionKind::HOLD, 50, 50),
];
