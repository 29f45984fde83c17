#![no_main]

use libfuzzer_sys::fuzz_target;
use dotrun::metadata::cilimage::CilImage;

fuzz_target!(|data: &[u8]| {
    if let Ok(image) = CilImage::from_mem(data.to_vec()) {
        let entry = image.entry_point();
        let _ = image.method_body(entry);
    }
});
