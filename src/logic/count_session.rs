use itertools::Itertools;
use serde::Serialize;

use crate::error::{InventoryError, InventoryResult};
use crate::model::{
    generate_id, now_rfc3339, CompletionStatus, CompoundInstance, CountEntry, CountRecord,
    CountStatus, DiscrepancyResolution, ExpectedInstance, InventoryCountSession,
    LocationBreakdown, LocationProgress, MovedInstance, NewCountSession, SessionProgress,
    SessionStatus, UserContext,
};

/// Start a count session: snapshot the active instances stored at the
/// requested locations.
pub fn create_session(
    request: NewCountSession,
    instances: &[CompoundInstance],
    user: &UserContext,
) -> InventoryResult<InventoryCountSession> {
    let mut errors = Vec::new();
    if request.name.trim().is_empty() {
        errors.push("Session name is required".to_string());
    }
    let locations: Vec<String> = request
        .locations
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unique()
        .collect();
    if locations.is_empty() {
        errors.push("At least one location must be selected".to_string());
    }
    if !errors.is_empty() {
        return Err(InventoryError::Validation(errors));
    }

    let expected_instances: Vec<ExpectedInstance> = instances
        .iter()
        .filter(|i| i.is_active() && locations.contains(&i.location))
        .map(|i| ExpectedInstance {
            instance_id: i.id.clone(),
            compound_id: i.compound_id.clone(),
            location: i.location.clone(),
            expected_quantity: i.quantity,
            unit: i.unit.clone(),
        })
        .collect();

    let mut session = InventoryCountSession {
        id: generate_id(),
        name: request.name.trim().to_string(),
        description: request.description.filter(|d| !d.trim().is_empty()),
        locations,
        status: SessionStatus::Active,
        total_items: expected_instances.len(),
        expected_instances,
        location_breakdown: Vec::new(),
        counted_items: 0,
        verified_items: 0,
        counts: Vec::new(),
        new_instances: Vec::new(),
        moved_instances: Vec::new(),
        notes: String::new(),
        start_date: now_rfc3339(),
        completed_date: None,
        created_by: user.user_id.clone(),
        created_by_name: user.user_name.clone(),
        completed_by: None,
    };
    recompute_totals(&mut session);
    Ok(session)
}

fn ensure_active(session: &InventoryCountSession) -> InventoryResult<()> {
    if session.is_active() {
        Ok(())
    } else {
        Err(InventoryError::InvalidState(format!(
            "Count session '{}' is completed and cannot be modified",
            session.name
        )))
    }
}

/// Differences below this are float noise from summed inputs (0.1 + 0.2 vs 0.3)
const COUNT_TOLERANCE: f64 = 1e-9;

fn is_discrepancy(difference: f64) -> bool {
    difference.abs() > COUNT_TOLERANCE
}

fn status_for(discrepancy: f64, resolution: Option<DiscrepancyResolution>) -> CountStatus {
    if !is_discrepancy(discrepancy) {
        return CountStatus::Verified;
    }
    match resolution {
        Some(DiscrepancyResolution::Confirm) => CountStatus::Discrepancy,
        Some(DiscrepancyResolution::Accept) => CountStatus::Verified,
        None => CountStatus::Unverified,
    }
}

/// Record (or replace) the count of one instance.
///
/// Snapshot instances may be found at another session location, which is
/// recorded as a move. Instances outside the snapshot are only accepted when
/// they were added during this count or currently sit at a session location.
pub fn record_count(
    session: &mut InventoryCountSession,
    entry: CountEntry,
    instances: &[CompoundInstance],
    user: &UserContext,
) -> InventoryResult<CountRecord> {
    ensure_active(session)?;

    let mut errors = Vec::new();
    if entry.instance_id.trim().is_empty() {
        errors.push("Instance ID is required".to_string());
    }
    if !entry.not_found && entry.counted_quantity < 0.0 {
        errors.push("Counted quantity cannot be negative".to_string());
    }
    if !errors.is_empty() {
        return Err(InventoryError::Validation(errors));
    }

    let (compound_id, home_location, expected_quantity) = match session.expected(&entry.instance_id) {
        Some(expected) => (
            expected.compound_id.clone(),
            expected.location.clone(),
            expected.expected_quantity,
        ),
        None => {
            let instance = instances
                .iter()
                .find(|i| i.id == entry.instance_id)
                .ok_or_else(|| InventoryError::not_found("Instance", &entry.instance_id))?;
            let added_here = session.new_instances.contains(&instance.id);
            if !added_here && !session.covers_location(&instance.location) {
                return Err(InventoryError::InvalidState(format!(
                    "Instance '{}' is stored at '{}', which is not part of this count session",
                    instance.id, instance.location
                )));
            }
            (
                instance.compound_id.clone(),
                instance.location.clone(),
                instance.quantity,
            )
        }
    };

    let location = match entry.location.as_deref().map(str::trim) {
        Some(found_at) if !found_at.is_empty() && found_at != home_location => {
            if !session.covers_location(found_at) {
                return Err(InventoryError::validation(format!(
                    "Location '{}' is not part of this count session",
                    found_at
                )));
            }
            session.moved_instances.retain(|m| m.instance_id != entry.instance_id);
            session.moved_instances.push(MovedInstance {
                instance_id: entry.instance_id.clone(),
                from_location: home_location.clone(),
                to_location: found_at.to_string(),
            });
            found_at.to_string()
        }
        _ => {
            session.moved_instances.retain(|m| m.instance_id != entry.instance_id);
            home_location
        }
    };

    let counted_quantity = if entry.not_found { 0.0 } else { entry.counted_quantity };
    let difference = counted_quantity - expected_quantity;
    let discrepancy = if is_discrepancy(difference) { difference } else { 0.0 };
    let status = if entry.not_found {
        CountStatus::NotFound
    } else {
        status_for(discrepancy, entry.resolution)
    };

    let record = CountRecord {
        instance_id: entry.instance_id.clone(),
        compound_id,
        location,
        expected_quantity,
        counted_quantity,
        discrepancy,
        status,
        notes: entry.notes.filter(|n| !n.trim().is_empty()),
        counted_by: user.user_name.clone(),
        counted_at: now_rfc3339(),
    };

    session.counts.retain(|c| c.instance_id != record.instance_id);
    session.counts.push(record.clone());
    recompute_totals(session);
    Ok(record)
}

/// Resolve an unverified count
pub fn verify_count(
    session: &mut InventoryCountSession,
    instance_id: &str,
    resolution: DiscrepancyResolution,
) -> InventoryResult<CountRecord> {
    ensure_active(session)?;
    let record = session
        .counts
        .iter_mut()
        .find(|c| c.instance_id == instance_id)
        .ok_or_else(|| InventoryError::not_found("Count record", instance_id))?;
    if record.status != CountStatus::Unverified {
        return Err(InventoryError::InvalidState(format!(
            "Count for instance '{}' is already resolved",
            instance_id
        )));
    }
    record.status = match resolution {
        DiscrepancyResolution::Confirm => CountStatus::Discrepancy,
        DiscrepancyResolution::Accept => CountStatus::Verified,
    };
    let record = record.clone();
    recompute_totals(session);
    Ok(record)
}

/// Check that an instance discovered during the count can be added at `location`
pub fn check_new_instance_location(
    session: &InventoryCountSession,
    location: &str,
) -> InventoryResult<()> {
    ensure_active(session)?;
    if session.covers_location(location.trim()) {
        Ok(())
    } else {
        Err(InventoryError::validation(format!(
            "Location '{}' is not part of this count session",
            location
        )))
    }
}

pub fn register_new_instance(
    session: &mut InventoryCountSession,
    instance_id: &str,
) -> InventoryResult<()> {
    ensure_active(session)?;
    if !session.new_instances.iter().any(|id| id == instance_id) {
        session.new_instances.push(instance_id.to_string());
    }
    Ok(())
}

fn snapshot_records<'a>(
    session: &'a InventoryCountSession,
) -> impl Iterator<Item = &'a CountRecord> + 'a {
    session
        .counts
        .iter()
        .filter(move |c| session.expected(&c.instance_id).is_some())
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Refresh the counters and the per-location breakdown from `counts`
pub fn recompute_totals(session: &mut InventoryCountSession) {
    let breakdown: Vec<LocationBreakdown> = session
        .locations
        .iter()
        .map(|location| {
            let expected_here: Vec<&ExpectedInstance> = session
                .expected_instances
                .iter()
                .filter(|e| &e.location == location)
                .collect();
            let records: Vec<&CountRecord> = expected_here
                .iter()
                .filter_map(|e| session.count_for(&e.instance_id))
                .collect();
            LocationBreakdown {
                location: location.clone(),
                total_items: expected_here.len(),
                counted_items: records.len(),
                verified_items: records.iter().filter(|r| r.status.is_terminal()).count(),
            }
        })
        .collect();

    session.total_items = session.expected_instances.len();
    session.counted_items = snapshot_records(session).count();
    session.verified_items = snapshot_records(session)
        .filter(|r| r.status.is_terminal())
        .count();
    session.location_breakdown = breakdown;
}

pub fn progress(session: &InventoryCountSession) -> SessionProgress {
    let mut session = session.clone();
    recompute_totals(&mut session);
    SessionProgress {
        total_items: session.total_items,
        counted_items: session.counted_items,
        verified_items: session.verified_items,
        progress: percentage(session.verified_items, session.total_items),
        locations: session
            .location_breakdown
            .iter()
            .map(|b| LocationProgress {
                location: b.location.clone(),
                total_items: b.total_items,
                counted_items: b.counted_items,
                verified_items: b.verified_items,
                progress: percentage(b.verified_items, b.total_items),
            })
            .collect(),
    }
}

pub fn completion_status(session: &InventoryCountSession) -> CompletionStatus {
    let total = session.expected_instances.len();
    let counted = snapshot_records(session).count();
    let verified = snapshot_records(session)
        .filter(|r| r.status.is_terminal())
        .count();

    let reason = if counted < total {
        Some(format!("{} instances not yet counted", total - counted))
    } else if verified < total {
        Some(format!("{} instances not yet verified", total - verified))
    } else {
        None
    };

    CompletionStatus {
        can_complete: reason.is_none(),
        total_instances: total,
        counted_instances: counted,
        verified_instances: verified,
        reason,
    }
}

/// Close the session. Counted quantities are not written back to instances.
pub fn complete_session(
    session: &mut InventoryCountSession,
    notes: Option<String>,
    user: &UserContext,
) -> InventoryResult<()> {
    ensure_active(session)?;
    let status = completion_status(session);
    if let Some(reason) = status.reason {
        return Err(InventoryError::InvalidState(format!(
            "Count session cannot be completed: {}",
            reason
        )));
    }
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        session.notes = notes;
    }
    session.status = SessionStatus::Completed;
    session.completed_date = Some(now_rfc3339());
    session.completed_by = Some(user.user_name.clone());
    recompute_totals(session);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscrepancyReport {
    pub session_id: String,
    pub session_name: String,
    pub status: SessionStatus,
    pub items: Vec<CountRecord>,
    pub moved_instances: Vec<MovedInstance>,
    pub not_found: usize,
}

/// Counts whose quantity differs from the snapshot, for manual reconciliation
pub fn discrepancy_report(session: &InventoryCountSession) -> DiscrepancyReport {
    DiscrepancyReport {
        session_id: session.id.clone(),
        session_name: session.name.clone(),
        status: session.status,
        items: session
            .counts
            .iter()
            .filter(|c| is_discrepancy(c.discrepancy))
            .cloned()
            .collect(),
        moved_instances: session.moved_instances.clone(),
        not_found: session
            .counts
            .iter()
            .filter(|c| c.status == CountStatus::NotFound)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CountEntry, NewInstance};

    fn instance(location: &str, quantity: f64) -> CompoundInstance {
        NewInstance {
            compound_id: "c1".to_string(),
            batch_number: String::new(),
            quantity,
            unit: "g".to_string(),
            location: location.to_string(),
            received_date: None,
            expiry_date: None,
            opened_date: None,
            description: None,
        }
        .into_instance()
    }

    fn cabinet_fixture() -> (InventoryCountSession, Vec<CompoundInstance>) {
        let instances = vec![
            instance("Cabinet A", 10.0),
            instance("Cabinet A", 20.0),
            instance("Cabinet A", 30.0),
            instance("Cabinet B", 40.0),
            instance("Cabinet B", 50.0),
            instance("Fridge", 60.0),
        ];
        let session = create_session(
            NewCountSession {
                name: "Q1 count".to_string(),
                description: None,
                locations: vec!["Cabinet A".to_string(), "Cabinet B".to_string()],
            },
            &instances,
            &UserContext::system(),
        )
        .unwrap();
        (session, instances)
    }

    #[test]
    fn test_create_requires_name_and_location() {
        let err = create_session(
            NewCountSession {
                name: " ".to_string(),
                description: None,
                locations: vec![],
            },
            &[],
            &UserContext::system(),
        )
        .unwrap_err();
        assert_eq!(err.details().len(), 2);
    }

    #[test]
    fn test_snapshot_covers_selected_locations() {
        let (session, _) = cabinet_fixture();
        assert_eq!(session.total_items, 5);
        assert_eq!(session.location_breakdown.len(), 2);
        assert_eq!(session.location_breakdown[0].total_items, 3);
    }

    #[test]
    fn test_four_of_five_counted_cannot_complete() {
        let (mut session, instances) = cabinet_fixture();
        let user = UserContext::system();
        for expected in session.expected_instances.clone().iter().take(4) {
            record_count(
                &mut session,
                CountEntry::counted(&expected.instance_id, expected.expected_quantity),
                &instances,
                &user,
            )
            .unwrap();
        }
        let status = completion_status(&session);
        assert!(!status.can_complete);
        assert_eq!(status.counted_instances, 4);
        assert_eq!(status.reason.as_deref(), Some("1 instances not yet counted"));
        assert!(complete_session(&mut session, None, &user).is_err());
    }

    #[test]
    fn test_unverified_discrepancy_blocks_completion() {
        let (mut session, instances) = cabinet_fixture();
        let user = UserContext::system();
        let expected = session.expected_instances.clone();
        for e in &expected {
            record_count(
                &mut session,
                CountEntry::counted(&e.instance_id, e.expected_quantity),
                &instances,
                &user,
            )
            .unwrap();
        }
        let short = record_count(
            &mut session,
            CountEntry::counted(&expected[0].instance_id, 7.0),
            &instances,
            &user,
        )
        .unwrap();
        assert_eq!(short.discrepancy, -3.0);
        assert_eq!(short.status, CountStatus::Unverified);
        assert_eq!(session.counts.len(), 5);

        let status = completion_status(&session);
        assert_eq!(status.reason.as_deref(), Some("1 instances not yet verified"));

        verify_count(&mut session, &expected[0].instance_id, DiscrepancyResolution::Confirm).unwrap();
        assert!(completion_status(&session).can_complete);
        assert_eq!(progress(&session).progress, 100.0);

        complete_session(&mut session, Some("All good".to_string()), &user).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_date.is_some());
        assert_eq!(discrepancy_report(&session).items.len(), 1);

        let late = record_count(
            &mut session,
            CountEntry::counted(&expected[1].instance_id, 1.0),
            &instances,
            &user,
        );
        assert!(matches!(late, Err(InventoryError::InvalidState(_))));
    }

    #[test]
    fn test_resolution_and_not_found_statuses() {
        let (mut session, instances) = cabinet_fixture();
        let user = UserContext::system();
        let ids: Vec<String> = session
            .expected_instances
            .iter()
            .map(|e| e.instance_id.clone())
            .collect();

        let accepted = record_count(
            &mut session,
            CountEntry::counted(&ids[0], 9.5).with_resolution(DiscrepancyResolution::Accept),
            &instances,
            &user,
        )
        .unwrap();
        assert_eq!(accepted.status, CountStatus::Verified);

        let missing = record_count(&mut session, CountEntry::missing(&ids[1]), &instances, &user).unwrap();
        assert_eq!(missing.status, CountStatus::NotFound);
        assert_eq!(missing.discrepancy, -20.0);
        assert_eq!(session.verified_items, 2);
    }

    #[test]
    fn test_summed_count_within_tolerance_is_verified() {
        let instances = vec![instance("Shelf", 0.3)];
        let user = UserContext::system();
        let mut session = create_session(
            NewCountSession {
                name: "Spot check".to_string(),
                description: None,
                locations: vec!["Shelf".to_string()],
            },
            &instances,
            &user,
        )
        .unwrap();

        let record = record_count(
            &mut session,
            CountEntry::counted(&instances[0].id, 0.1 + 0.2),
            &instances,
            &user,
        )
        .unwrap();
        assert_eq!(record.status, CountStatus::Verified);
        assert_eq!(record.discrepancy, 0.0);
        assert!(discrepancy_report(&session).items.is_empty());
        assert!(completion_status(&session).can_complete);
    }

    #[test]
    fn test_moved_and_foreign_instances() {
        let (mut session, instances) = cabinet_fixture();
        let user = UserContext::system();
        let in_a = session.expected_instances[0].instance_id.clone();

        let mut entry = CountEntry::counted(&in_a, 10.0);
        entry.location = Some("Cabinet B".to_string());
        let record = record_count(&mut session, entry, &instances, &user).unwrap();
        assert_eq!(record.location, "Cabinet B");
        assert_eq!(session.moved_instances.len(), 1);
        assert_eq!(session.moved_instances[0].from_location, "Cabinet A");

        let fridge = instances.iter().find(|i| i.location == "Fridge").unwrap();
        let rejected = record_count(
            &mut session,
            CountEntry::counted(&fridge.id, 60.0),
            &instances,
            &user,
        );
        assert!(matches!(rejected, Err(InventoryError::InvalidState(_))));
    }

    #[test]
    fn test_new_instances_do_not_change_totals() {
        let (mut session, _) = cabinet_fixture();
        assert!(check_new_instance_location(&session, "Fridge").is_err());
        check_new_instance_location(&session, "Cabinet B").unwrap();
        register_new_instance(&mut session, "found-1").unwrap();
        register_new_instance(&mut session, "found-1").unwrap();
        assert_eq!(session.new_instances, vec!["found-1".to_string()]);
        assert_eq!(completion_status(&session).total_instances, 5);
    }
}
