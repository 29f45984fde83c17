#![no_main]

use libfuzzer_sys::fuzz_target;
use dotrun::metadata::signatures::{parse_local_var_signature, parse_method_signature};

fuzz_target!(|data: &[u8]| {
    let _ = parse_method_signature(data);
    let _ = parse_local_var_signature(data);
});
