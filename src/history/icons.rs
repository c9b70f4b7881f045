//! Embedded icon.sys payloads injected at region bootstrap.

/// Default payload, used for the North America and Europe regions and any
/// unrecognized tag.
pub static ICON_AMERICA: &[u8] = include_bytes!("../../assets/icon_A.sys");
pub static ICON_CHINA: &[u8] = include_bytes!("../../assets/icon_C.sys");
pub static ICON_JAPAN: &[u8] = include_bytes!("../../assets/icon_J.sys");

pub fn payload_for(tag: char) -> &'static [u8] {
    match tag {
        super::REGION_CHINA => ICON_CHINA,
        super::REGION_JAPAN => ICON_JAPAN,
        _ => ICON_AMERICA,
    }
}
