//! Process-global lifecycle and the public lookup surface.

use pixelfish::{Endpoint, Error};

#[test]
fn init_exit_lifecycle() {
    // Pre-init: lookups are nil, operations report NotInitialized.
    assert!(pixelfish::format("R'G'B' u8").is_none());
    assert!(matches!(
        pixelfish::fish("R'G'B' u8", "RGBA float"),
        Err(Error::NotInitialized)
    ));

    pixelfish::init();
    pixelfish::init(); // double init is idempotent

    let fmt = pixelfish::format("R'G'B' u8").expect("built-in format");
    assert!(pixelfish::format_exists("R'G'B' u8"));
    assert_eq!(pixelfish::format_n_components(fmt).unwrap(), 3);
    assert_eq!(pixelfish::format_bytes_per_pixel(fmt).unwrap(), 3);

    let t0 = pixelfish::format_type(fmt, 0).unwrap();
    assert_eq!(pixelfish::get_name(Endpoint::Type(t0)).unwrap(), "u8");
    assert_eq!(pixelfish::ty("u8"), Some(t0));
    assert!(pixelfish::component("CIE L").is_some());
    assert!(pixelfish::model("camayakaA").is_some());

    let fish = pixelfish::fish("R'G'B' u8", "R'G'B'A float").unwrap();
    let src = [10u8, 20, 30];
    let mut dst = [0u8; 16];
    assert_eq!(pixelfish::process(&fish, &src, &mut dst, 1).unwrap(), 1);

    pixelfish::exit();
    assert!(matches!(
        pixelfish::fish("R'G'B' u8", "RGBA float"),
        Err(Error::NotInitialized)
    ));
    assert!(pixelfish::format("R'G'B' u8").is_none());

    // And back up again.
    pixelfish::init();
    assert!(pixelfish::format_exists("R'G'B' u8"));
    pixelfish::exit();
}
