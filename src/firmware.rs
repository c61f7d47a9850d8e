use std::fs;
use std::path::Path;

use ihex::Reader;
use tracing::debug;

use crate::error::{LinkError, LinkResult};

/// Parse intel hex file raw string to binary
pub fn parse_intel_hex(hex_content: &str) -> LinkResult<Vec<u8>> {
    let mut bin = Vec::new();
    for record in Reader::new(hex_content) {
        match record {
            Ok(ihex::Record::Data { value, .. }) => bin.extend_from_slice(&value),
            Ok(_) => {}
            Err(e) => {
                return Err(LinkError::FirmwareError(format!(
                    "Failed parsing record in hex file {:?}",
                    e
                )));
            }
        }
    }

    Ok(bin)
}

/// Load a firmware image. `.hex` files are decoded as Intel HEX, anything
/// else is sent as is.
pub fn load(path: &Path) -> LinkResult<Vec<u8>> {
    let is_hex = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hex"));

    let image = if is_hex {
        let hex_content = fs::read_to_string(path).map_err(|e| {
            LinkError::FirmwareError(format!("Could not read {}: {}", path.display(), e))
        })?;
        parse_intel_hex(&hex_content)?
    } else {
        fs::read(path).map_err(|e| {
            LinkError::FirmwareError(format!("Could not read {}: {}", path.display(), e))
        })?
    };

    debug!("Loaded {} bytes from {}", image.len(), path.display());
    Ok(image)
}
