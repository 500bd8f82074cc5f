// Copyright 2025 Radio Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Reduces per-replica write outcomes to an overall verdict: the lowest
/// succeeding replica index becomes the source of truth, and only when
/// every replica failed is the first error surfaced. One accepted write is
/// enough to acknowledge the client; the divergence is journaled by the
/// caller.
pub fn reduce_write_errs<E>(errs: &[Option<E>]) -> (Option<usize>, Option<&E>) {
    if let Some(index) = errs.iter().position(Option::is_none) {
        return (Some(index), None);
    }
    (None, errs.iter().find_map(Option::as_ref))
}
