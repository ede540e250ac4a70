// Copyright 2025 framewire developers
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

use tokio::sync::broadcast;

/// Per-task view of the server-wide shutdown signal.
///
/// Each long-running loop holds its own `Shutdown` and polls [`recv`] from
/// inside its select loop; once the signal has been observed, `recv`
/// completes immediately on every later call.
///
/// [`recv`]: Shutdown::recv
#[derive(Debug)]
pub struct Shutdown {
    signalled: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            signalled: false,
            notify,
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled
    }

    pub async fn recv(&mut self) {
        if self.signalled {
            return;
        }
        let _ = self.notify.recv().await;
        self.signalled = true;
    }
}
