// Raffle state machine: Idle -> Open (join window) -> Resolving -> Idle.
//
// State and session live behind one mutex. `pick_winner` flips Open to
// Resolving and takes the session in a single critical section, so a join can
// never land after the draw has started and none is dropped mid-draw. Ledger
// and chat calls run after the lock is released.

use crate::command::Participant;
use crate::error::{parse_amount, AmountError};
use crate::host::Host;
use crate::routing::{render, MessageDispatcher, Placeholders};
use crate::settings::RaffleSettings;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, RngCore};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    Idle,
    Open,
    Resolving,
}

/// One join window. Exists only while the engine is not Idle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaffleSession {
    win_amount: i64,
    started_by: Participant,
    opened_at_ms: u64,
    participants: Vec<Participant>,
}

impl RaffleSession {
    pub fn win_amount(&self) -> i64 {
        self.win_amount
    }

    pub fn started_by(&self) -> &Participant {
        &self.started_by
    }

    pub fn opened_at_ms(&self) -> u64 {
        self.opened_at_ms
    }

    /// Join order, one entry per user.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started { win_amount: i64 },
    /// A raffle is already open or resolving.
    Busy,
    PermissionDenied,
    /// `OnlyLive` is set and the stream is offline.
    Offline,
    InvalidAmount(AmountError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyJoined,
    NotOpen,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PickOutcome {
    Winner {
        winner: Participant,
        amount: i64,
        balance: i64,
    },
    /// A winner was drawn but the ledger would not credit them.
    PayoutRefused {
        winner: Participant,
        amount: i64,
    },
    NoParticipants,
}

struct Inner {
    state: RaffleState,
    session: Option<RaffleSession>,
}

pub struct RaffleEngine {
    inner: Mutex<Inner>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl RaffleEngine {
    /// Engine drawing winners from the OS entropy source.
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }

    /// Engine with a caller-supplied cryptographic RNG (seeded in tests).
    pub fn with_rng<R: RngCore + CryptoRng + Send + 'static>(rng: R) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RaffleState::Idle,
                session: None,
            }),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> RaffleState {
        self.lock().state
    }

    /// Snapshot of the active session, if any.
    pub fn session(&self) -> Option<RaffleSession> {
        self.lock().session.clone()
    }

    /// How long the current window has been open, None unless Open.
    pub fn open_for_ms(&self, now_ms: u64) -> Option<u64> {
        let inner = self.lock();
        match (&inner.state, &inner.session) {
            (RaffleState::Open, Some(session)) => Some(now_ms.saturating_sub(session.opened_at_ms)),
            _ => None,
        }
    }

    /// Drop any session and go back to Idle.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = RaffleState::Idle;
        inner.session = None;
    }

    pub fn start<H: Host + ?Sized>(
        &self,
        requester: &Participant,
        raw_amount: &str,
        settings: &RaffleSettings,
        host: &mut H,
    ) -> StartOutcome {
        if self.state() != RaffleState::Idle {
            tracing::debug!(user = %requester.user, "raffle start ignored, raffle in progress");
            return StartOutcome::Busy;
        }

        let currency = host.currency_name();
        let dispatcher = MessageDispatcher::new(settings.usage);
        let vars = Placeholders {
            user: &requester.user_name,
            currency: &currency,
            target: "",
            permission: &settings.permission,
            permission_info: &settings.permission_info,
        };

        if !host.has_permission(&requester.user, &settings.permission, &settings.permission_info) {
            let msg = render(
                &settings.permission_response,
                &[&requester.user_name, &settings.permission, &settings.permission_info],
                &vars,
            );
            dispatcher.reply(host, requester, &msg);
            return StartOutcome::PermissionDenied;
        }

        if settings.only_live && !host.is_live() {
            tracing::debug!(user = %requester.user, "raffle start ignored, stream offline");
            return StartOutcome::Offline;
        }

        let win_amount = match parse_amount(raw_amount) {
            Ok(amount) => amount,
            Err(err) => {
                let msg = render(
                    &settings.invalid_amount_response,
                    &[&requester.user_name, &settings.command],
                    &vars,
                );
                dispatcher.reply(host, requester, &msg);
                return StartOutcome::InvalidAmount(err);
            }
        };

        {
            let mut inner = self.lock();
            if inner.state != RaffleState::Idle {
                return StartOutcome::Busy;
            }
            inner.state = RaffleState::Open;
            inner.session = Some(RaffleSession {
                win_amount,
                started_by: requester.clone(),
                opened_at_ms: host.now_ms(),
                participants: Vec::new(),
            });
        }
        tracing::info!(user = %requester.user, win_amount, "raffle opened");

        let msg = render(
            &settings.start_response,
            &[&win_amount, &currency, &settings.join_command],
            &vars,
        );
        dispatcher.reply(host, requester, &msg);
        StartOutcome::Started { win_amount }
    }

    pub fn join<H: Host + ?Sized>(
        &self,
        participant: &Participant,
        settings: &RaffleSettings,
        host: &mut H,
    ) -> JoinOutcome {
        {
            let mut inner = self.lock();
            if inner.state != RaffleState::Open {
                return JoinOutcome::NotOpen;
            }
            let Some(session) = inner.session.as_mut() else {
                return JoinOutcome::NotOpen;
            };
            if session.participants.iter().any(|p| p.user == participant.user) {
                return JoinOutcome::AlreadyJoined;
            }
            session.participants.push(participant.clone());
        }
        tracing::debug!(user = %participant.user, "joined raffle");

        let currency = host.currency_name();
        let vars = Placeholders {
            user: &participant.user_name,
            currency: &currency,
            target: "",
            permission: &settings.permission,
            permission_info: &settings.permission_info,
        };
        let msg = render(&settings.join_response, &[&participant.user_name], &vars);
        MessageDispatcher::new(settings.usage).reply(host, participant, &msg);
        JoinOutcome::Joined
    }

    /// Close the window and pay one uniformly chosen participant.
    /// None when no raffle is open.
    pub fn pick_winner<H: Host + ?Sized>(
        &self,
        triggered_by: &Participant,
        settings: &RaffleSettings,
        host: &mut H,
    ) -> Option<PickOutcome> {
        let session = {
            let mut inner = self.lock();
            if inner.state != RaffleState::Open {
                return None;
            }
            inner.state = RaffleState::Resolving;
            inner.session.take()
        };

        let outcome = self.resolve(session, triggered_by, settings, host);

        let mut inner = self.lock();
        inner.state = RaffleState::Idle;
        inner.session = None;
        Some(outcome)
    }

    fn resolve<H: Host + ?Sized>(
        &self,
        session: Option<RaffleSession>,
        triggered_by: &Participant,
        settings: &RaffleSettings,
        host: &mut H,
    ) -> PickOutcome {
        let dispatcher = MessageDispatcher::new(settings.usage);
        let currency = host.currency_name();

        let picked = session.as_ref().and_then(|s| {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let winner = s.participants.choose(&mut **rng).cloned();
            winner.map(|w| (w, s.win_amount))
        });

        let Some((winner, amount)) = picked else {
            tracing::info!("raffle closed without participants");
            let vars = Placeholders {
                user: &triggered_by.user_name,
                currency: &currency,
                target: "",
                permission: &settings.permission,
                permission_info: &settings.permission_info,
            };
            let msg = render(&settings.no_join_response, &[], &vars);
            dispatcher.reply(host, triggered_by, &msg);
            return PickOutcome::NoParticipants;
        };

        let vars = Placeholders {
            user: &winner.user_name,
            currency: &currency,
            target: "",
            permission: &settings.permission,
            permission_info: &settings.permission_info,
        };

        if !host.add_points(&winner.user, &winner.user_name, amount) {
            tracing::warn!(user = %winner.user, amount, "ledger refused raffle payout");
            let msg = render(
                &settings.payout_fail_response,
                &[&winner.user_name, &amount, &currency],
                &vars,
            );
            dispatcher.reply(host, triggered_by, &msg);
            return PickOutcome::PayoutRefused { winner, amount };
        }
        // read back so host-side caps show up in the announcement
        let balance = host.get_points(&winner.user);
        tracing::info!(user = %winner.user, amount, balance, "raffle winner paid");

        let msg = render(
            &settings.win_response,
            &[&winner.user_name, &amount, &balance, &currency],
            &vars,
        );
        dispatcher.reply(host, triggered_by, &msg);

        PickOutcome::Winner {
            winner,
            amount,
            balance,
        }
    }
}

impl Default for RaffleEngine {
    fn default() -> Self {
        Self::new()
    }
}
