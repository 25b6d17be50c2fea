/// Pairing as an explicit state machine.
///
/// A new device is usable once two independent things have happened: the
/// phone accepted the QR code (`Paired`) and the service finished its own
/// setup (`Ready`). They can arrive in either order. Each state below names
/// which half we are still waiting for; `transition` is the only place that
/// decides when both halves are in.
use super::PairingEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum PairingState {
    /// Waiting for the first QR code.
    Started,
    /// A QR code is on screen; nothing confirmed yet.
    QrShown { url: String },
    /// The phone accepted; waiting for the service to report ready.
    PairedAwaitingReady,
    /// The service is ready; waiting for the phone.
    ReadyAwaitingPair,
    Complete,
    Failed(String),
}

/// Side effects a transition asks the driver to perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingStep {
    ShowQr(String),
    /// Save this credential blob.
    Persist(serde_json::Value),
    Done,
    Fail(String),
    /// Non-fatal problem worth surfacing.
    Warn(String),
}

impl PairingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairingState::Complete | PairingState::Failed(_))
    }

    pub fn transition(self, event: PairingEvent) -> (PairingState, Vec<PairingStep>) {
        use PairingState as S;
        use PairingStep as Step;

        if self.is_terminal() {
            return (self, vec![]);
        }

        match (self, event) {
            (_, PairingEvent::FatalError { error }) => (S::Failed(error.clone()), vec![Step::Fail(error)]),
            (state, PairingEvent::TemporaryError { error }) => (state, vec![Step::Warn(error)]),

            // QR codes rotate until the phone accepts one
            (S::Started | S::QrShown { .. }, PairingEvent::QrReady { url }) => {
                (S::QrShown { url: url.clone() }, vec![Step::ShowQr(url)])
            }
            (S::ReadyAwaitingPair, PairingEvent::QrReady { url }) => {
                (S::ReadyAwaitingPair, vec![Step::ShowQr(url)])
            }
            (state @ S::PairedAwaitingReady, PairingEvent::QrReady { .. }) => (state, vec![]),

            (S::Started | S::QrShown { .. }, PairingEvent::Paired { session }) => {
                (S::PairedAwaitingReady, vec![Step::Persist(session)])
            }
            (S::ReadyAwaitingPair, PairingEvent::Paired { session }) => {
                (S::Complete, vec![Step::Persist(session), Step::Done])
            }
            (state @ S::PairedAwaitingReady, PairingEvent::Paired { .. }) => (state, vec![]),

            (S::Started | S::QrShown { .. }, PairingEvent::Ready) => (S::ReadyAwaitingPair, vec![]),
            (S::PairedAwaitingReady, PairingEvent::Ready) => (S::Complete, vec![Step::Done]),
            (state @ S::ReadyAwaitingPair, PairingEvent::Ready) => (state, vec![]),

            // Terminal states were returned above
            (state @ (S::Complete | S::Failed(_)), _) => (state, vec![]),
        }
    }
}
