//! Device profiles
//!
//! A profile is everything device-specific the link needs: the pin
//! capability table, the opcode map and a few board facts.

use pinwire_protocol::{OpcodeMap, PinId};

use crate::capability::{
    CapabilityTable, PinCapability, ANALOG_DIGITAL, ANALOG_ONLY, DIGITAL_PWM, DIGITAL_SERVO,
    ModeSet,
};

/// Passthrough serial port used by the StandardFirmata serial feature
/// (first software serial)
pub const SOFTWARE_SERIAL_0: u8 = 0x08;

/// Board description
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    /// Human-readable name
    pub name: &'static str,
    pub capabilities: CapabilityTable,
    pub opcodes: OpcodeMap,
    /// Pin wired to the on-board buzzer
    pub tone_pin: Option<PinId>,
    /// Firmware port id of the passthrough serial
    pub serial_port: u8,
    /// Firmware can run composite actuator sequences
    pub sequences: bool,
}

/// ATmega328P pin map shared by the Uno and the Nano
///
/// D0/D1 carry the host link and are reserved. A6/A7 only exist on the Nano
/// and have no digital buffer.
const fn atmega328p(pin: u8) -> PinCapability {
    match pin {
        0 | 1 => PinCapability::new(pin, ModeSet::EMPTY),
        2 => PinCapability::new(pin, DIGITAL_SERVO).interrupt(),
        3 => PinCapability::new(pin, DIGITAL_PWM).interrupt(),
        5 | 6 | 9 | 10 | 11 => PinCapability::new(pin, DIGITAL_PWM),
        14..=19 => PinCapability::new(pin, ANALOG_DIGITAL).analog(pin - 14),
        20 | 21 => PinCapability::new(pin, ANALOG_ONLY).analog(pin - 14),
        _ => PinCapability::new(pin, DIGITAL_SERVO),
    }
}

static UNO_PINS: [PinCapability; 20] = [
    atmega328p(0),
    atmega328p(1),
    atmega328p(2),
    atmega328p(3),
    atmega328p(4),
    atmega328p(5),
    atmega328p(6),
    atmega328p(7),
    atmega328p(8),
    atmega328p(9),
    atmega328p(10),
    atmega328p(11),
    atmega328p(12),
    atmega328p(13),
    atmega328p(14),
    atmega328p(15),
    atmega328p(16),
    atmega328p(17),
    atmega328p(18),
    atmega328p(19),
];

static NANO_PINS: [PinCapability; 22] = [
    atmega328p(0),
    atmega328p(1),
    atmega328p(2),
    atmega328p(3),
    atmega328p(4),
    atmega328p(5),
    atmega328p(6),
    atmega328p(7),
    atmega328p(8),
    atmega328p(9),
    atmega328p(10),
    atmega328p(11),
    atmega328p(12),
    atmega328p(13),
    atmega328p(14),
    atmega328p(15),
    atmega328p(16),
    atmega328p(17),
    atmega328p(18),
    atmega328p(19),
    atmega328p(20),
    atmega328p(21),
];

/// Arduino Uno running StandardFirmata
pub static UNO: DeviceProfile = DeviceProfile {
    name: "Arduino Uno",
    capabilities: CapabilityTable::new(&UNO_PINS),
    opcodes: OpcodeMap::FIRMATA,
    tone_pin: None,
    serial_port: SOFTWARE_SERIAL_0,
    sequences: false,
};

/// Arduino Nano running StandardFirmata
pub static NANO: DeviceProfile = DeviceProfile {
    name: "Arduino Nano",
    capabilities: CapabilityTable::new(&NANO_PINS),
    opcodes: OpcodeMap::FIRMATA,
    tone_pin: None,
    serial_port: SOFTWARE_SERIAL_0,
    sequences: false,
};

/// Otto biped robot (Nano with a buzzer on D13 and leg servos)
pub static OTTO: DeviceProfile = DeviceProfile {
    name: "Otto",
    capabilities: CapabilityTable::new(&NANO_PINS),
    opcodes: OpcodeMap::FIRMATA,
    tone_pin: Some(PinId(13)),
    serial_port: SOFTWARE_SERIAL_0,
    sequences: true,
};
