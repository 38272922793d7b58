use std::{ops::ControlFlow, sync::Arc};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    select,
    sync::{broadcast::error::RecvError, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    directory::{DirectoryError, PartnerDirectory},
    models::{types::UtcDateTime, Partner, PartnerSubmissionId, Submission, SubmissionId},
    notifier::{Notifier, NotifierError},
    repository::{
        PartnerRepository, PartnerStorageEvent, PartnerSubmissionRepository,
        PendingPartnerSubmission, SubmissionRepository, SubmissionStorageEvent,
    },
    utils::daily_time::DailyTime,
};

/// Matches approved submissions with partners and sends partners a daily digest of
/// the submissions they have not seen yet.
pub struct PartnerSubmissionService {
    submission_repository: Arc<SubmissionRepository>,
    partner_repository: Arc<PartnerRepository>,
    partner_submission_repository: Arc<PartnerSubmissionRepository>,
    directory: Arc<dyn PartnerDirectory>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DailyBatchReport {
    pub emails_sent: usize,
    pub partner_submissions_notified: u64,
    pub partners_without_contacts: usize,
    pub partners_failed: usize,
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error("Could not look up the partner: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Could not send the digest: {0}")]
    Notifier(#[from] NotifierError),
}

enum Delivery {
    Sent,
    NoContacts,
}

impl PartnerSubmissionService {
    pub fn new(
        submission_repository: Arc<SubmissionRepository>,
        partner_repository: Arc<PartnerRepository>,
        partner_submission_repository: Arc<PartnerSubmissionRepository>,
        directory: Arc<dyn PartnerDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> PartnerSubmissionService {
        PartnerSubmissionService {
            submission_repository,
            partner_repository,
            partner_submission_repository,
            directory,
            notifier,
        }
    }

    /// Pairs the partner with every approved submission it has not been paired with yet.
    ///
    /// Returns the number of pairs created.
    #[tracing::instrument(skip(self, partner), fields(partner_id = partner.id.0))]
    pub async fn generate_for_new_partner(&self, partner: &Partner) -> Result<u64, anyhow::Error> {
        let submissions = self.submission_repository.get_approved_submissions().await?;

        let mut created = 0;
        for submission in &submissions {
            if self
                .partner_submission_repository
                .create(submission.id, partner.id)
                .await?
            {
                created += 1;
            }
        }

        info!(
            "Paired partner {} with {created} of {} approved submissions",
            partner.name,
            submissions.len()
        );

        Ok(created)
    }

    /// Pairs a freshly approved submission with every partner.
    ///
    /// Does nothing if the submission does not exist or is not approved.
    /// Returns the number of pairs created.
    #[tracing::instrument(skip(self))]
    pub async fn generate_for_all_partners(
        &self,
        submission_id: SubmissionId,
    ) -> Result<u64, anyhow::Error> {
        let submission = match self.submission_repository.get_submission(submission_id).await? {
            Some(submission) if submission.is_approved() => submission,
            Some(submission) => {
                debug!(
                    "Submission {submission_id:?} is {}, not pairing it",
                    submission.state
                );
                return Ok(0);
            }
            None => {
                debug!("Submission {submission_id:?} does not exist");
                return Ok(0);
            }
        };

        let partners = self.partner_repository.get_all_partners().await?;

        let mut created = 0;
        for partner in &partners {
            if self
                .partner_submission_repository
                .create(submission.id, partner.id)
                .await?
            {
                created += 1;
            }
        }

        info!(
            "Paired submission {:?} with {created} of {} partners",
            submission.id,
            partners.len()
        );

        Ok(created)
    }

    /// Sends every partner with pending approved submissions one digest and marks
    /// the included submissions as notified.
    ///
    /// Lookup and delivery failures are confined to the partner they happened for;
    /// its submissions stay pending for the next run. Storage failures are returned.
    #[tracing::instrument(skip(self))]
    pub async fn daily_batch(&self) -> Result<DailyBatchReport, anyhow::Error> {
        let mut report = DailyBatchReport::default();

        let partners = self
            .partner_submission_repository
            .get_partners_with_pending()
            .await?;

        info!("{} partners have pending submissions", partners.len());

        for partner in partners {
            let pending = self
                .partner_submission_repository
                .get_pending_for_partner(partner.id)
                .await?;

            if pending.is_empty() {
                continue;
            }

            match self.deliver_digest(&partner, &pending).await {
                Ok(Delivery::Sent) => {
                    report.emails_sent += 1;

                    let ids: Vec<PartnerSubmissionId> = pending
                        .iter()
                        .map(|p| p.partner_submission.id)
                        .collect();
                    report.partner_submissions_notified += self
                        .partner_submission_repository
                        .mark_notified(&ids, UtcDateTime::now())
                        .await?;
                }

                Ok(Delivery::NoContacts) => {
                    info!(
                        "Partner {} ({}) has no contacts, skipping {} submissions",
                        partner.name,
                        partner.external_id,
                        pending.len()
                    );
                    report.partners_without_contacts += 1;
                }

                Err(err) => {
                    error!(
                        "Could not deliver digest to partner {} ({}): {err}",
                        partner.name, partner.external_id
                    );
                    report.partners_failed += 1;
                }
            }
        }

        info!("Daily batch finished: {report:?}");

        Ok(report)
    }

    async fn deliver_digest(
        &self,
        partner: &Partner,
        pending: &[PendingPartnerSubmission],
    ) -> Result<Delivery, DeliveryError> {
        let contacts = self.directory.partner_contacts(&partner.external_id).await?;
        if contacts.is_empty() {
            return Ok(Delivery::NoContacts);
        }

        let display_name = self
            .directory
            .partner_display_name(&partner.external_id)
            .await?;

        let submissions: Vec<Submission> = pending.iter().map(|p| p.submission.clone()).collect();

        self.notifier
            .send_digest(&contacts, &display_name, &submissions)
            .await?;

        Ok(Delivery::Sent)
    }

    /// Pairs every partner with every approved submission, for when approval events were missed.
    async fn resync_all_partners(&self) -> Result<(), anyhow::Error> {
        for partner in self.partner_repository.get_all_partners().await? {
            self.generate_for_new_partner(&partner).await?;
        }

        Ok(())
    }

    async fn on_submission_event(
        &self,
        evt: Result<SubmissionStorageEvent, RecvError>,
    ) -> ControlFlow<()> {
        match evt {
            Ok(SubmissionStorageEvent::SubmissionApproved(id)) => {
                if let Err(err) = self.generate_for_all_partners(id).await {
                    error!("Could not pair approved submission {id:?} with partners: {err}");
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Missed {missed} submission events, pairing everything");
                if let Err(err) = self.resync_all_partners().await {
                    error!("Could not pair partners after missed events: {err}");
                }
            }
            Err(RecvError::Closed) => {
                error!("Submission events channel closed, stopping");
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    async fn on_partner_event(
        &self,
        evt: Result<PartnerStorageEvent, RecvError>,
    ) -> ControlFlow<()> {
        match evt {
            Ok(PartnerStorageEvent::PartnerCreated(partner)) => {
                if let Err(err) = self.generate_for_new_partner(&partner).await {
                    error!("Could not pair new partner {}: {err}", partner.name);
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Missed {missed} partner events, pairing everything");
                if let Err(err) = self.resync_all_partners().await {
                    error!("Could not pair partners after missed events: {err}");
                }
            }
            Err(RecvError::Closed) => {
                error!("Partner events channel closed, stopping");
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    /// Runs the service until `shutdown` is notified: reacts to approved submissions and
    /// new partners, and runs the daily batch every day at `daily_batch_at`.
    pub fn start(
        self: Arc<Self>,
        daily_batch_at: DailyTime,
        shutdown: Arc<Notify>,
    ) -> JoinHandle<()> {
        let mut submission_events = self.submission_repository.subscribe();
        let mut partner_events = self.partner_repository.subscribe();

        tokio::spawn(
            async move {
                let mut last_batch_time = None;

                loop {
                    let now = OffsetDateTime::now_utc();
                    let next_batch_time = next_batch_time(daily_batch_at, now, last_batch_time);
                    let sleep_duration = std::time::Duration::try_from(next_batch_time - now)
                        .unwrap_or(std::time::Duration::ZERO);

                    debug!(
                        "Next daily batch scheduled at {next_batch_time} (in {:?})",
                        sleep_duration
                    );

                    select! {
                        _ = shutdown.notified() => {
                            info!("Shutdown requested, stopping");
                            break;
                        }

                        _ = tokio::time::sleep(sleep_duration) => {
                            last_batch_time = Some(next_batch_time);
                            if let Err(err) = self.daily_batch().await {
                                error!("Could not run the daily batch: {err}");
                            }
                        }

                        evt = submission_events.recv() => {
                            if self.on_submission_event(evt).await.is_break() {
                                break;
                            }
                        }

                        evt = partner_events.recv() => {
                            if self.on_partner_event(evt).await.is_break() {
                                break;
                            }
                        }
                    }
                }
            }
            .instrument(info_span!("partner_submission_service")),
        )
    }
}

/// The next daily batch slot after `now`. A slot that has already run is never picked again,
/// even when the timer fires slightly early.
fn next_batch_time(
    daily_batch_at: DailyTime,
    now: OffsetDateTime,
    last_batch_time: Option<OffsetDateTime>,
) -> OffsetDateTime {
    match last_batch_time {
        Some(last) if last > now => daily_batch_at.next_after(last),
        _ => daily_batch_at.next_after(now),
    }
}
