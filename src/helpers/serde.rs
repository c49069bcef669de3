use serde::{Deserialize, Serializer};

/// Stores a `u64` as the `i64` with the same bits.
/// Pickle integers beyond `i64` do not survive a round trip through every reader.
pub fn serialize_u64_bits<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(*value as i64)
}

pub fn deserialize_u64_bits<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<u64, D::Error> {
    Ok(i64::deserialize(deserializer)? as u64)
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Wrapper(
        #[serde(
            serialize_with = "serialize_u64_bits",
            deserialize_with = "deserialize_u64_bits"
        )]
        u64,
    );

    #[test]
    fn u64_bits_pickle_ok() -> crate::Result {
        let wrapper = Wrapper(u64::MAX - 1);
        let bytes = serde_pickle::to_vec(&wrapper, Default::default())?;
        assert_eq!(serde_pickle::from_slice::<Wrapper>(&bytes, Default::default())?, wrapper);
        Ok(())
    }
}
