use repl_schemas::{ChecksumAlg, Event, EventPayload, ReplError};

/// Checksum bypass only applies to `FormatDescription`/`Rotate` read from a
/// primary the Receiver already knows is checksum-unaware.
fn bypasses_checksum(event: &Event, alg: ChecksumAlg) -> bool {
    alg.is_checksum_unaware()
        && matches!(
            event.payload,
            EventPayload::FormatDescription { .. } | EventPayload::Rotate { .. }
        )
}

pub fn verify(event: &Event, alg: ChecksumAlg, verify_enabled: bool) -> Result<(), ReplError> {
    if !verify_enabled || alg == ChecksumAlg::Off || bypasses_checksum(event, alg) {
        return Ok(());
    }
    if event.checksum.is_none() {
        return Err(ReplError::ProtocolFatal {
            message: format!("missing checksum on {} event under negotiated {alg:?}", event.type_name()),
        });
    }
    Ok(())
}
