// Copyright 2025 jonefeewang@gmail.com
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

/// Per-task view of the server-wide shutdown broadcast. Once the signal
/// has been observed it stays observed; `recv` returns immediately after.
#[derive(Debug)]
pub struct Shutdown {
    triggered: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            triggered: false,
            notify,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub async fn recv(&mut self) {
        if self.triggered {
            return;
        }
        let _ = self.notify.recv().await;
        self.triggered = true;
    }
}
