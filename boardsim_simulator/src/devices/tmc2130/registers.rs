// TMC2130 register map (the subset the firmware touches).

use boardsim_shared::regs::{Access, FieldSpec, RegisterLayout, RegisterSpec};

/// 7-bit addressing.
pub const REGISTER_COUNT: usize = 128;

pub const GCONF: u8 = 0x00;
pub const GSTAT: u8 = 0x01;
pub const IHOLD_IRUN: u8 = 0x10;
pub const CHOPCONF: u8 = 0x6C;
pub const COOLCONF: u8 = 0x6D;
pub const DRV_STATUS: u8 = 0x6F;

const GCONF_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("i_scale_analog", 0, 1),
    FieldSpec::new("internal_rsense", 1, 1),
    FieldSpec::new("en_pwm_mode", 2, 1),
    FieldSpec::new("enc_commutation", 3, 1),
    FieldSpec::new("shaft", 4, 1),
    FieldSpec::new("diag0_error", 5, 1),
    FieldSpec::new("diag0_otpw", 6, 1),
    FieldSpec::new("diag0_stall", 7, 1),
    FieldSpec::new("diag1_stall", 8, 1),
    FieldSpec::new("diag1_index", 9, 1),
    FieldSpec::new("diag1_onstate", 10, 1),
    FieldSpec::new("diag1_steps_skipped", 11, 1),
    FieldSpec::new("diag0_int_pushpull", 12, 1),
    FieldSpec::new("diag1_pushpull", 13, 1),
    FieldSpec::new("small_hysteresis", 14, 1),
    FieldSpec::new("stop_enable", 15, 1),
    FieldSpec::new("direct_mode", 16, 1),
];

const GSTAT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("reset", 0, 1),
    FieldSpec::new("drv_err", 1, 1),
    FieldSpec::new("uv_cp", 2, 1),
];

const IHOLD_IRUN_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("ihold", 0, 5),
    FieldSpec::new("irun", 8, 5),
    FieldSpec::new("iholddelay", 16, 4),
];

const CHOPCONF_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("toff", 0, 4),
    FieldSpec::new("hstrt", 4, 3),
    FieldSpec::new("hend", 7, 4),
    FieldSpec::new("fd3", 11, 1),
    FieldSpec::new("disfdcc", 12, 1),
    FieldSpec::new("rndtf", 13, 1),
    FieldSpec::new("chm", 14, 1),
    FieldSpec::new("tbl", 15, 2),
    FieldSpec::new("vsense", 17, 1),
    FieldSpec::new("vhighfs", 18, 1),
    FieldSpec::new("vhighchm", 19, 1),
    FieldSpec::new("sync", 20, 4),
    FieldSpec::new("mres", 24, 4),
    FieldSpec::new("intpol", 28, 1),
    FieldSpec::new("dedge", 29, 1),
    FieldSpec::new("diss2g", 30, 1),
];

const COOLCONF_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("semin", 0, 4),
    FieldSpec::new("seup", 5, 2),
    FieldSpec::new("semax", 8, 4),
    FieldSpec::new("sedn", 13, 2),
    FieldSpec::new("seimin", 15, 1),
    FieldSpec::new("sgt", 16, 7),
    FieldSpec::new("sfilt", 24, 1),
];

const DRV_STATUS_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("sg_result", 0, 10),
    FieldSpec::new("fsactive", 15, 1),
    FieldSpec::new("cs_actual", 16, 5),
    FieldSpec::new("stallguard", 24, 1),
    FieldSpec::new("ot", 25, 1),
    FieldSpec::new("otpw", 26, 1),
    FieldSpec::new("s2ga", 27, 1),
    FieldSpec::new("s2gb", 28, 1),
    FieldSpec::new("ola", 29, 1),
    FieldSpec::new("olb", 30, 1),
    FieldSpec::new("stst", 31, 1),
];

pub const LAYOUT: RegisterLayout = RegisterLayout {
    registers: &[
        RegisterSpec {
            address: GCONF,
            name: "GCONF",
            access: Access::ReadWrite,
            fields: GCONF_FIELDS,
        },
        RegisterSpec {
            address: GSTAT,
            name: "GSTAT",
            access: Access::Diagnostic,
            fields: GSTAT_FIELDS,
        },
        RegisterSpec {
            address: IHOLD_IRUN,
            name: "IHOLD_IRUN",
            access: Access::ReadWrite,
            fields: IHOLD_IRUN_FIELDS,
        },
        RegisterSpec {
            address: CHOPCONF,
            name: "CHOPCONF",
            access: Access::ReadWrite,
            fields: CHOPCONF_FIELDS,
        },
        RegisterSpec {
            address: COOLCONF,
            name: "COOLCONF",
            access: Access::ReadWrite,
            fields: COOLCONF_FIELDS,
        },
        RegisterSpec {
            address: DRV_STATUS,
            name: "DRV_STATUS",
            access: Access::Diagnostic,
            fields: DRV_STATUS_FIELDS,
        },
    ],
};

/// SG_RESULT reported while the motor turns freely.
pub const SG_RESULT_FREE: u32 = 250;

/// Looks up `register.field` in the layout.
pub fn field(register: u8, name: &str) -> Option<(&'static RegisterSpec, &'static FieldSpec)> {
    let reg = LAYOUT.by_address(register)?;
    Some((reg, reg.field(name)?))
}
