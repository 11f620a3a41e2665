// (C) Copyright 2025 flagcore contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Consistent-hash bucketing.
//!
//! Every language port sharing one flag store must place the same subject into
//! the same bucket, so the hash below is a compatibility contract: 32-bit
//! FNV-1a over `flagName + bucketingKey`, scaled into the caller-chosen range
//! by a plain modulo. Do not change it without updating the published test
//! vectors used by the other ports.

const FNV_OFFSET_BASIS_32: u32 = 0x811c_9dc5;
const FNV_PRIME_32: u32 = 16_777_619;

/// 32-bit FNV-1a.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS_32;
    for byte in data {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME_32);
    }
    hash
}

/// Hashes `flag_name + bucketing_key` into the half-open range `[0, max)`.
///
/// `max` of zero yields zero, so a misconfigured percentage sum cannot panic
/// the evaluation.
pub fn build_hash(flag_name: &str, bucketing_key: &str, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    let mut input = String::with_capacity(flag_name.len() + bucketing_key.len());
    input.push_str(flag_name);
    input.push_str(bucketing_key);
    fnv1a_32(input.as_bytes()) % max
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// This test ensures that this port uses the same hashing algorithm as the
    /// other language clients sharing a flag store. The expected values are
    /// the published cross-SDK vectors.
    #[rstest]
    #[case("flagNameUserKey", 3_946_001_934)]
    #[case("", 2_166_136_261)]
    fn test_fnv1a_32_known_vectors(#[case] input: &str, #[case] expected: u32) {
        assert_eq!(fnv1a_32(input.as_bytes()), expected);
    }

    #[test]
    fn test_build_hash_is_deterministic() {
        let first = build_hash("my-flag", "user-key", 100_000);
        for _ in 0..100 {
            assert_eq!(build_hash("my-flag", "user-key", 100_000), first);
        }
    }

    #[test]
    fn test_build_hash_is_scaled_into_range() {
        for max in [1, 7, 100, 100_000] {
            let hash = build_hash("my-flag", "user-key", max);
            assert!(hash < max);
        }
    }

    #[test]
    fn test_build_hash_zero_range() {
        assert_eq!(build_hash("my-flag", "user-key", 0), 0);
    }

    #[test]
    fn test_build_hash_concatenates_flag_and_key() {
        // "ab" + "c" and "a" + "bc" are the same input on purpose: the
        // concatenation itself is part of the cross-SDK contract.
        assert_eq!(build_hash("ab", "c", 100_000), build_hash("a", "bc", 100_000));
    }
}
