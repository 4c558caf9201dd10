//! Stable storage keys for cached requests.

use sha2::{Digest, Sha256};

use crate::http::Request;

/// Storage key for a request.
///
/// Cache entries are matched on method and URL only, so those are the only
/// inputs. The URL is taken without its fragment.
pub fn request_key(request: &Request) -> String {
  let input = format!("{} {}", request.method, request.match_url());

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}
