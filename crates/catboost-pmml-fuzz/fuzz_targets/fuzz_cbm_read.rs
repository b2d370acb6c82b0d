#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

use catboost_pmml::{read_ensemble, to_pmml_string, EncoderConfig};

fuzz_target!(|data: &[u8]| {
    let cursor = Cursor::new(data);
    if let Ok(ensemble) = read_ensemble(cursor) {
        let _ = to_pmml_string(&ensemble, &EncoderConfig::default());
    }
});
