//! The [`OrderNumbering`] facade.
//!
//! A host's order lifecycle constructs one `OrderNumbering` over its record
//! store and calls the `on_*` methods from its own event handling. Nothing
//! is registered globally.

use std::collections::BTreeMap;
use std::sync::Arc;

use ordseq_store::{RecordStore, StoreError};
use ordseq_types::{NewRecord, OrderRecord, OrderStatus, RecordKey, SequentialNumber};
use tracing::debug;

use crate::allocator::{Allocation, SequenceAllocator};
use crate::config::NumberingConfig;
use crate::error::NumberingResult;
use crate::formatter::DisplayFormatter;
use crate::migrator::{BackfillMigrator, MigrationReport, UpgradeHook};
use crate::resolver::{IdentifierResolver, Resolution};

/// Sequential numbering wired to one record store.
pub struct OrderNumbering<S: ?Sized> {
    store: Arc<S>,
    config: NumberingConfig,
    allocator: SequenceAllocator<S>,
    resolver: IdentifierResolver<S>,
    migrator: BackfillMigrator<S>,
    formatter: DisplayFormatter,
}

impl<S: RecordStore + ?Sized> OrderNumbering<S> {
    pub fn new(store: Arc<S>, config: NumberingConfig) -> NumberingResult<Self> {
        config.validate()?;
        Ok(Self {
            allocator: SequenceAllocator::new(Arc::clone(&store), &config),
            resolver: IdentifierResolver::new(Arc::clone(&store), &config),
            migrator: BackfillMigrator::new(Arc::clone(&store), &config),
            formatter: DisplayFormatter::from_config(&config),
            store,
            config,
        })
    }

    pub fn with_upgrade_hook(mut self, hook: impl UpgradeHook + 'static) -> Self {
        self.migrator = self.migrator.with_hook(hook);
        self
    }

    pub fn config(&self) -> &NumberingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn allocator(&self) -> &SequenceAllocator<S> {
        &self.allocator
    }

    pub fn resolver(&self) -> &IdentifierResolver<S> {
        &self.resolver
    }

    pub fn migrator(&self) -> &BackfillMigrator<S> {
        &self.migrator
    }

    pub fn formatter(&self) -> &DisplayFormatter {
        &self.formatter
    }

    // ---- Lifecycle events ----

    /// An order was created or finalized.
    pub fn on_order_saved(&self, record: &OrderRecord) -> Allocation {
        self.allocator.assign_record(record)
    }

    /// A subscription created a renewal order.
    pub fn on_renewal_created(&self, key: RecordKey) -> Allocation {
        self.allocator.assign(key)
    }

    /// Numbering was activated or upgraded.
    pub fn on_activation(&self) -> NumberingResult<MigrationReport> {
        self.migrator.install()
    }

    // ---- Queries ----

    pub fn resolve(&self, identifier: &str) -> NumberingResult<Resolution> {
        self.resolver.resolve(identifier)
    }

    pub fn sequential_number(&self, key: RecordKey) -> NumberingResult<Option<SequentialNumber>> {
        Ok(self.allocator.current(key)?)
    }

    /// The order's display number, or `default` if it has none.
    pub fn display_number(&self, record: &OrderRecord, default: &str) -> NumberingResult<String> {
        let number = self.sequential_number(record.key)?;
        Ok(self.formatter.format(number.as_ref(), default))
    }

    // ---- Duplication ----

    /// Whether a property is owned by numbering and must not be copied to
    /// derived orders.
    pub fn is_numbering_property(&self, name: &str) -> bool {
        name == self.config.property_name
    }

    /// Properties of `source` that a derived order may inherit.
    pub fn copyable_properties(
        &self,
        source: RecordKey,
    ) -> NumberingResult<BTreeMap<String, String>> {
        let mut properties = self.store.properties(source)?;
        properties.retain(|name, _| !self.is_numbering_property(name));
        Ok(properties)
    }

    /// Create a renewal of `source`: a new order carrying the source's
    /// properties except its number, then numbered on its own.
    pub fn create_renewal(
        &self,
        source: RecordKey,
        status: OrderStatus,
    ) -> NumberingResult<(OrderRecord, Allocation)> {
        if !self.store.exists(source)? {
            return Err(StoreError::RecordNotFound(source).into());
        }
        let properties = self.copyable_properties(source)?;
        let renewal = self.store.insert_record(NewRecord::new(status))?;
        for (name, value) in &properties {
            self.store.set_property(renewal.key, name, value)?;
        }
        debug!(
            source = %source,
            renewal = %renewal.key,
            copied = properties.len(),
            "created renewal order"
        );

        let allocation = self.on_renewal_created(renewal.key);
        Ok((renewal, allocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NumberingError;
    use ordseq_store::{InMemoryRecordStore, SqliteRecordStore};

    const NUMBER: &str = "_order_number";

    fn numbering<S: RecordStore>(store: S) -> OrderNumbering<S> {
        OrderNumbering::new(Arc::new(store), NumberingConfig::default()).unwrap()
    }

    fn create<S: RecordStore + ?Sized>(
        n: &OrderNumbering<S>,
        status: OrderStatus,
    ) -> (OrderRecord, Allocation) {
        let record = n.store().insert_record(NewRecord::new(status)).unwrap();
        let allocation = n.on_order_saved(&record);
        (record, allocation)
    }

    fn legacy<S: RecordStore + ?Sized>(n: &OrderNumbering<S>, key: u64) -> RecordKey {
        n.store()
            .insert_record(NewRecord::new(OrderStatus::Completed).with_key(RecordKey::new(key)))
            .unwrap()
            .key
    }

    fn scenario_a<S: RecordStore>(n: OrderNumbering<S>) {
        let numbers: Vec<_> = (0..3)
            .map(|_| create(&n, OrderStatus::Pending).1.number().cloned().unwrap())
            .collect();
        assert_eq!(numbers, vec!["1", "2", "3"]);
    }

    fn scenario_b<S: RecordStore>(n: OrderNumbering<S>) {
        let ten = legacy(&n, 10);
        let twenty = legacy(&n, 20);
        let report = n.on_activation().unwrap();
        assert_eq!(report.backfilled, 2);
        assert_eq!(n.sequential_number(ten).unwrap().unwrap(), "10");
        assert_eq!(n.sequential_number(twenty).unwrap().unwrap(), "20");

        // A second activation sees the marker and changes nothing.
        let again = n.on_activation().unwrap();
        assert_eq!(again.backfilled, 0);
        assert!(!again.version_written);

        // New orders continue after the legacy keys.
        let (_, allocation) = create(&n, OrderStatus::Processing);
        assert_eq!(allocation.number().unwrap(), "21");
    }

    fn scenario_e<S: RecordStore>(n: OrderNumbering<S>) {
        let (first, _) = create(&n, OrderStatus::Completed);
        assert_eq!(n.sequential_number(first.key).unwrap().unwrap(), "1");
        let ten = legacy(&n, 10);
        n.allocator().assign(ten);
        assert_eq!(n.sequential_number(ten).unwrap().unwrap(), "2");

        assert_eq!(n.resolve("10").unwrap(), Resolution::NotFound);
        assert_eq!(n.resolve("2").unwrap(), Resolution::BySequentialNumber(ten));
    }

    fn negative_values_ignored<S: RecordStore>(n: OrderNumbering<S>) {
        let (stray, _) = create(&n, OrderStatus::Draft);
        n.store().set_property(stray.key, NUMBER, "-5").unwrap();

        let (record, allocation) = create(&n, OrderStatus::Pending);
        assert_eq!(allocation, Allocation::Assigned(SequentialNumber::from_value(1)));
        assert_eq!(n.sequential_number(record.key).unwrap().unwrap(), "1");
    }

    fn round_trip<S: RecordStore>(n: OrderNumbering<S>) {
        let (record, allocation) = create(&n, OrderStatus::Processing);
        let number = allocation.number().unwrap().clone();
        assert_eq!(
            n.resolve(number.as_str()).unwrap(),
            Resolution::BySequentialNumber(record.key)
        );
        let shown = n.display_number(&record, &record.key.to_string()).unwrap();
        assert_eq!(n.resolve(&shown).unwrap().key(), Some(record.key));
        assert_eq!(n.resolve("4242").unwrap(), Resolution::NotFound);
    }

    // ---- Test 1: Scenario A on both backends ----
    #[test]
    fn three_orders_numbered_in_sequence() {
        scenario_a(numbering(InMemoryRecordStore::new()));
        scenario_a(numbering(SqliteRecordStore::open_in_memory().unwrap()));
    }

    // ---- Test 2: Scenario B on both backends ----
    #[test]
    fn legacy_orders_backfilled_with_keys() {
        scenario_b(numbering(InMemoryRecordStore::new()));
        scenario_b(numbering(SqliteRecordStore::open_in_memory().unwrap()));
    }

    // ---- Test 3: Scenario E on both backends ----
    #[test]
    fn coincidental_key_guard() {
        scenario_e(numbering(InMemoryRecordStore::new()));
        scenario_e(numbering(SqliteRecordStore::open_in_memory().unwrap()));
    }

    // ---- Test 4: Resolver round trip on both backends ----
    #[test]
    fn resolve_round_trip() {
        round_trip(numbering(InMemoryRecordStore::new()));
        round_trip(numbering(SqliteRecordStore::open_in_memory().unwrap()));
    }

    // ---- Test 5: Negative stored values on both backends ----
    #[test]
    fn negative_values_do_not_raise_the_sequence() {
        negative_values_ignored(numbering(InMemoryRecordStore::new()));
        negative_values_ignored(numbering(SqliteRecordStore::open_in_memory().unwrap()));
    }

    // ---- Test 6: Scenario C: two conflicts, then success ----
    #[test]
    fn conflicts_then_success() {
        let n = numbering(InMemoryRecordStore::new());
        create(&n, OrderStatus::Completed);
        let record = n.store().insert_record(NewRecord::new(OrderStatus::Pending)).unwrap();
        n.store().inject_sequence_conflicts(2);

        let allocation = n.on_order_saved(&record);
        assert_eq!(allocation, Allocation::Assigned(SequentialNumber::from_value(2)));
        let properties = n.store().properties(record.key).unwrap();
        assert_eq!(properties.len(), 1);
        assert_eq!(properties.get(NUMBER).map(String::as_str), Some("2"));
    }

    // ---- Test 7: Scenario D: every attempt conflicts ----
    #[test]
    fn all_attempts_conflict() {
        let n = numbering(InMemoryRecordStore::new());
        let record = n.store().insert_record(NewRecord::new(OrderStatus::Pending)).unwrap();
        n.store().inject_sequence_conflicts(3);

        let allocation = n.on_order_saved(&record);
        assert!(matches!(allocation, Allocation::Abandoned { attempts: 3, .. }));
        assert!(n.sequential_number(record.key).unwrap().is_none());
        assert_eq!(n.display_number(&record, "1").unwrap(), "1");
        // The order is still reachable by its key.
        assert_eq!(n.resolve("1").unwrap(), Resolution::ByRecordKey(record.key));
    }

    // ---- Test 8: Drafts wait for finalization ----
    #[test]
    fn draft_numbered_on_finalization() {
        let n = numbering(InMemoryRecordStore::new());
        let (draft, allocation) = create(&n, OrderStatus::Draft);
        assert_eq!(allocation, Allocation::SkippedDraft);
        assert!(n.sequential_number(draft.key).unwrap().is_none());

        let finalized = n.store().update_status(draft.key, OrderStatus::Processing).unwrap();
        assert_eq!(n.on_order_saved(&finalized).number().unwrap(), "1");
    }

    // ---- Test 9: Display formatting ----
    #[test]
    fn display_number_uses_prefix() {
        let n = numbering(InMemoryRecordStore::new());
        let (record, _) = create(&n, OrderStatus::Completed);
        assert_eq!(n.display_number(&record, "ignored").unwrap(), "#1");
    }

    // ---- Test 10: Renewals never inherit the number ----
    #[test]
    fn renewal_gets_its_own_number() {
        let n = numbering(InMemoryRecordStore::new());
        let (parent, _) = create(&n, OrderStatus::Completed);
        n.store().set_property(parent.key, "_billing_email", "a@example.com").unwrap();

        let copyable = n.copyable_properties(parent.key).unwrap();
        assert!(!copyable.contains_key(NUMBER));
        assert_eq!(copyable.len(), 1);

        let (renewal, allocation) = n.create_renewal(parent.key, OrderStatus::Pending).unwrap();
        assert_eq!(allocation.number().unwrap(), "2");
        let properties = n.store().properties(renewal.key).unwrap();
        assert_eq!(properties.get("_billing_email").map(String::as_str), Some("a@example.com"));
        assert_eq!(properties.get(NUMBER).map(String::as_str), Some("2"));
    }

    // ---- Test 11: Renewal of a missing order ----
    #[test]
    fn renewal_requires_source() {
        let n = numbering(InMemoryRecordStore::new());
        let err = n.create_renewal(RecordKey::new(5), OrderStatus::Pending).unwrap_err();
        assert!(matches!(err, NumberingError::Store(StoreError::RecordNotFound(_))));
    }

    // ---- Test 12: Invalid configuration is rejected ----
    #[test]
    fn invalid_config_rejected() {
        let config = NumberingConfig {
            max_attempts: 0,
            ..Default::default()
        };
        let result = OrderNumbering::new(Arc::new(InMemoryRecordStore::new()), config);
        assert!(matches!(result, Err(NumberingError::Config(_))));
    }

    // ---- Test 13: Works through a trait object ----
    #[test]
    fn dyn_store() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let n = OrderNumbering::new(store, NumberingConfig::default()).unwrap();
        let (_, allocation) = create(&n, OrderStatus::Pending);
        assert!(allocation.is_assigned());
    }
}
