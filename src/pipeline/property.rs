/// Property identifiers understood by the pipeline session.
///
/// The discriminants match the historical capture property ids, so
/// bindings that carry numeric property keys can cast them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// Stream position in milliseconds
    PosMsec = 0,
    /// Stream position in frames
    PosFrames = 1,
    /// Stream position as a ratio in [0, 1]
    PosAviRatio = 2,
    /// Negotiated frame width
    FrameWidth = 3,
    /// Negotiated frame height
    FrameHeight = 4,
    /// Negotiated frame rate
    Fps = 5,
    /// App-sink queue depth
    QueueLength = 200,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_match_the_historical_ids() {
        assert_eq!(Property::PosMsec as i32, 0);
        assert_eq!(Property::Fps as i32, 5);
        assert_eq!(Property::QueueLength as i32, 200);
    }
}
