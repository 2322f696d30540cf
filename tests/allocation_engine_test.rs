// ==========================================
// 分配引擎集成测试 (纯内存, 不经数据库)
// ==========================================
// 测试目标: 容量上限、候补顺序、无重复成员、晋升、急诊挤占、终态幂等
// ==========================================

#[cfg(test)]
mod allocation_engine_test {
    use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
    use opd_token_engine::config::AllocationPolicy;
    use opd_token_engine::domain::ledger::SlotContext;
    use opd_token_engine::domain::slot::TimeSlot;
    use opd_token_engine::domain::types::{TokenSource, TokenStatus, VictimPolicy};
    use opd_token_engine::engine::{
        AllocationEngine, AllocationOutcome, AllocationRequest, EmergencyAdmission, Placement,
        ReallocationEngine, ReleaseEffect,
    };
    use proptest::prelude::*;
    use std::collections::HashSet;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    struct Harness {
        ctx: SlotContext,
        policy: AllocationPolicy,
        clock: DateTime<Utc>,
        issued: u32,
        allocation: AllocationEngine,
        emergency: EmergencyAdmission,
        reallocation: ReallocationEngine,
    }

    impl Harness {
        fn new(capacity: u32) -> Self {
            let slot = TimeSlot {
                slot_id: "DOC001-20260129-0900".to_string(),
                doctor_id: "DOC001".to_string(),
                slot_date: NaiveDate::from_ymd_opt(2026, 1, 29).unwrap(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                max_capacity: capacity,
                next_seq_no: 1,
                created_at: Utc.with_ymd_and_hms(2026, 1, 28, 0, 0, 0).unwrap(),
            };
            Self {
                ctx: SlotContext::new(slot),
                policy: AllocationPolicy::default(),
                clock: Utc.with_ymd_and_hms(2026, 1, 29, 7, 0, 0).unwrap(),
                issued: 0,
                allocation: AllocationEngine::new(),
                emergency: EmergencyAdmission::new(),
                reallocation: ReallocationEngine::new(),
            }
        }

        fn request(&mut self, name: &str, source: TokenSource) -> AllocationRequest {
            self.issued += 1;
            self.clock = self.clock + Duration::seconds(1);
            AllocationRequest {
                token_id: format!("TKN-{}", name),
                patient_id: format!("PAT-{}", name),
                source,
                requested_at: self.clock,
            }
        }

        fn allocate(&mut self, name: &str, source: TokenSource) -> AllocationOutcome {
            let request = self.request(name, source);
            let outcome = self
                .allocation
                .allocate(&mut self.ctx, request, &self.policy)
                .unwrap();
            self.assert_invariants();
            outcome
        }

        fn emergency(&mut self, name: &str) -> AllocationOutcome {
            let request = self.request(name, TokenSource::Emergency);
            let outcome = self
                .emergency
                .allocate_emergency(&mut self.ctx, request, &self.policy)
                .unwrap();
            self.assert_invariants();
            outcome
        }

        fn cancel(&mut self, name: &str) -> ReleaseEffect {
            self.clock = self.clock + Duration::seconds(1);
            let outcome = self
                .reallocation
                .cancel(&mut self.ctx, &format!("TKN-{}", name), &self.policy, self.clock)
                .unwrap();
            self.assert_invariants();
            outcome.effect
        }

        fn no_show(&mut self, name: &str) -> ReleaseEffect {
            self.clock = self.clock + Duration::seconds(1);
            let outcome = self
                .reallocation
                .no_show(&mut self.ctx, &format!("TKN-{}", name), &self.policy, self.clock)
                .unwrap();
            self.assert_invariants();
            outcome.effect
        }

        fn confirmed(&self) -> Vec<String> {
            self.ctx
                .ledger
                .confirmed()
                .iter()
                .map(|e| e.token_id.trim_start_matches("TKN-").to_string())
                .collect()
        }

        fn waitlist(&self) -> Vec<String> {
            self.ctx
                .ledger
                .waitlist()
                .iter()
                .map(|e| e.token_id.trim_start_matches("TKN-").to_string())
                .collect()
        }

        fn status(&self, name: &str) -> TokenStatus {
            self.ctx.tokens[&format!("TKN-{}", name)].status
        }

        fn seq_no(&self, name: &str) -> Option<u32> {
            self.ctx.tokens[&format!("TKN-{}", name)].seq_no
        }

        /// 每次变更后检查名单不变量
        fn assert_invariants(&self) {
            let ledger = &self.ctx.ledger;
            assert!(ledger.confirmed().len() as u32 <= ledger.capacity(), "确认人数超出容量");

            for pair in ledger.waitlist().windows(2) {
                let a = &self.ctx.tokens[&pair[0].token_id];
                let b = &self.ctx.tokens[&pair[1].token_id];
                assert!(
                    (a.priority, a.created_at) <= (b.priority, b.created_at),
                    "候补顺序错误: {} 在 {} 之前",
                    a.token_id,
                    b.token_id
                );
            }

            let mut seen = HashSet::new();
            for entry in ledger.confirmed().iter().chain(ledger.waitlist()) {
                assert!(seen.insert(entry.token_id.clone()), "重复成员: {}", entry.token_id);
            }

            self.ctx.verify().unwrap();
        }
    }

    // ==========================================
    // 常规分配
    // ==========================================

    #[test]
    fn test_normal_path_confirms_until_full_then_waitlists() {
        let mut h = Harness::new(2);

        let a = h.allocate("A", TokenSource::OnlineBooking);
        let b = h.allocate("B", TokenSource::WalkIn);
        let c = h.allocate("C", TokenSource::PaidPriority);

        match a.placement {
            Placement::Confirmed { seq_no, estimated_time } => {
                assert_eq!(seq_no, 1);
                assert_eq!(estimated_time.format("%H:%M").to_string(), "09:00");
            }
            other => panic!("A 应被确认: {:?}", other),
        }
        match b.placement {
            Placement::Confirmed { seq_no, estimated_time } => {
                assert_eq!(seq_no, 2);
                assert_eq!(estimated_time.format("%H:%M").to_string(), "09:05");
            }
            other => panic!("B 应被确认: {:?}", other),
        }
        // 容量已满: 高优先级也只能候补, 不会被拒绝
        assert_eq!(
            c.placement,
            Placement::Waitlisted {
                position: 1,
                estimated_wait_minutes: 5
            }
        );
        assert!(c.displaced.is_none());
        assert_eq!(h.ctx.ledger.available_capacity(), 0);
    }

    #[test]
    fn test_waitlist_orders_by_priority_then_arrival() {
        let mut h = Harness::new(1);
        h.allocate("A", TokenSource::OnlineBooking);

        h.allocate("W1", TokenSource::WalkIn);
        h.allocate("O1", TokenSource::OnlineBooking);
        h.allocate("W2", TokenSource::WalkIn);
        h.allocate("P1", TokenSource::PaidPriority);
        h.allocate("F1", TokenSource::FollowUp);

        assert_eq!(h.waitlist(), vec!["P1", "F1", "O1", "W1", "W2"]);
        assert_eq!(h.ctx.ledger.waitlist_position("TKN-W2"), Some(5));
    }

    #[test]
    fn test_normal_path_emergency_source_does_not_displace() {
        let mut h = Harness::new(1);
        h.allocate("A", TokenSource::WalkIn);

        let e = h.allocate("E", TokenSource::Emergency);

        assert!(matches!(e.placement, Placement::Waitlisted { position: 1, .. }));
        assert_eq!(h.confirmed(), vec!["A"]);
    }

    // ==========================================
    // 重分配
    // ==========================================

    #[test]
    fn test_cancel_promotes_front_of_waitlist() {
        let mut h = Harness::new(3);
        h.allocate("A", TokenSource::OnlineBooking);
        h.allocate("B", TokenSource::OnlineBooking);
        h.allocate("C", TokenSource::OnlineBooking);
        h.allocate("W", TokenSource::WalkIn);
        h.allocate("F", TokenSource::FollowUp);

        let effect = h.cancel("B");

        match effect {
            ReleaseEffect::Promoted(p) => {
                assert_eq!(p.token_id, "TKN-F");
                assert_eq!(p.seq_no, 4);
            }
            other => panic!("应晋升候补首位: {:?}", other),
        }
        assert_eq!(h.confirmed().len(), 3);
        assert_eq!(h.waitlist(), vec!["W"]);
        assert_eq!(h.status("B"), TokenStatus::Cancelled);
        assert_eq!(h.seq_no("B"), None);
        assert_eq!(h.status("F"), TokenStatus::Confirmed);
    }

    #[test]
    fn test_no_show_with_empty_waitlist_frees_capacity() {
        let mut h = Harness::new(2);
        h.allocate("A", TokenSource::OnlineBooking);
        h.allocate("B", TokenSource::OnlineBooking);

        assert_eq!(h.no_show("A"), ReleaseEffect::NoEligibleWaitlistEntry);
        assert_eq!(h.ctx.ledger.available_capacity(), 1);
        assert_eq!(h.status("A"), TokenStatus::NoShow);

        // 空出的名额被下一个请求直接确认, 序号继续递增
        h.allocate("C", TokenSource::WalkIn);
        assert_eq!(h.seq_no("C"), Some(3));
    }

    #[test]
    fn test_cancel_waitlisted_does_not_promote() {
        let mut h = Harness::new(1);
        h.allocate("A", TokenSource::OnlineBooking);
        h.allocate("W1", TokenSource::WalkIn);
        h.allocate("W2", TokenSource::WalkIn);

        assert_eq!(h.cancel("W1"), ReleaseEffect::WaitlistEntryRemoved);
        assert_eq!(h.confirmed(), vec!["A"]);
        assert_eq!(h.waitlist(), vec!["W2"]);
    }

    #[test]
    fn test_double_cancel_is_reported_noop() {
        let mut h = Harness::new(1);
        h.allocate("A", TokenSource::OnlineBooking);
        h.allocate("W1", TokenSource::WalkIn);
        h.allocate("W2", TokenSource::WalkIn);

        assert!(matches!(h.cancel("A"), ReleaseEffect::Promoted(_)));
        assert_eq!(h.cancel("A"), ReleaseEffect::AlreadyTerminal);
        assert_eq!(h.no_show("A"), ReleaseEffect::AlreadyTerminal);

        // 第二次取消不触发二次晋升
        assert_eq!(h.confirmed(), vec!["W1"]);
        assert_eq!(h.waitlist(), vec!["W2"]);
        assert_eq!(h.status("A"), TokenStatus::Cancelled);
    }

    // ==========================================
    // 急诊
    // ==========================================

    #[test]
    fn test_emergency_displaces_lowest_priority_into_sorted_waitlist() {
        let mut h = Harness::new(4);
        h.allocate("P", TokenSource::PaidPriority);
        h.allocate("F", TokenSource::FollowUp);
        h.allocate("O", TokenSource::OnlineBooking);
        h.allocate("W", TokenSource::WalkIn);
        h.allocate("O2", TokenSource::OnlineBooking); // 候补
        h.allocate("W2", TokenSource::WalkIn); // 候补

        let e = h.emergency("E");

        assert!(matches!(e.placement, Placement::Confirmed { seq_no: 5, .. }));
        let displaced = e.displaced.unwrap();
        assert_eq!(displaced.token_id, "TKN-W");
        // W 创建早于 W2, 保留原时间戳排在 W2 之前
        assert_eq!(displaced.waitlist_position, 2);
        assert_eq!(h.confirmed(), vec!["P", "F", "O", "E"]);
        assert_eq!(h.waitlist(), vec!["O2", "W", "W2"]);
        assert_eq!(h.status("W"), TokenStatus::Waitlisted);
        assert_eq!(h.seq_no("W"), None);
    }

    #[test]
    fn test_emergency_tie_break_follows_victim_policy() {
        let mut recent = Harness::new(2);
        recent.allocate("W1", TokenSource::WalkIn);
        recent.allocate("W2", TokenSource::WalkIn);
        let outcome = recent.emergency("E");
        assert_eq!(outcome.displaced.unwrap().token_id, "TKN-W2");

        let mut earliest = Harness::new(2);
        earliest.policy.victim_policy = VictimPolicy::EarliestAdmitted;
        earliest.allocate("W1", TokenSource::WalkIn);
        earliest.allocate("W2", TokenSource::WalkIn);
        let outcome = earliest.emergency("E");
        assert_eq!(outcome.displaced.unwrap().token_id, "TKN-W1");
    }

    #[test]
    fn test_emergency_with_capacity_needs_no_displacement() {
        let mut h = Harness::new(2);
        h.allocate("A", TokenSource::WalkIn);

        let e = h.emergency("E");

        assert!(e.displaced.is_none());
        assert_eq!(h.confirmed(), vec!["A", "E"]);
    }

    #[test]
    fn test_peer_emergency_is_waitlisted() {
        let mut h = Harness::new(2);
        h.emergency("E1");
        h.emergency("E2");

        let e3 = h.emergency("E3");

        assert!(e3.displaced.is_none());
        assert!(matches!(e3.placement, Placement::Waitlisted { position: 1, .. }));
        assert_eq!(h.confirmed(), vec!["E1", "E2"]);

        // 急诊候补排在所有其他候补之前
        h.allocate("W", TokenSource::WalkIn);
        assert_eq!(h.waitlist(), vec!["E3", "W"]);
    }

    #[test]
    fn test_displaced_token_is_repromoted_first() {
        let mut h = Harness::new(2);
        h.allocate("A", TokenSource::OnlineBooking);
        h.allocate("B", TokenSource::OnlineBooking);
        h.allocate("W", TokenSource::WalkIn);
        h.emergency("E");
        assert_eq!(h.waitlist(), vec!["B", "W"]);

        match h.cancel("A") {
            ReleaseEffect::Promoted(p) => assert_eq!(p.token_id, "TKN-B"),
            other => panic!("被挤出的号源应优先晋升: {:?}", other),
        }
        assert_eq!(h.confirmed(), vec!["E", "B"]);
    }

    // ==========================================
    // 场景
    // ==========================================

    #[test]
    fn test_capacity_two_scenario() {
        let mut h = Harness::new(2);

        h.allocate("A", TokenSource::OnlineBooking);
        h.allocate("B", TokenSource::OnlineBooking);
        assert_eq!(h.seq_no("A"), Some(1));
        assert_eq!(h.seq_no("B"), Some(2));

        let c = h.allocate("C", TokenSource::PaidPriority);
        assert!(matches!(c.placement, Placement::Waitlisted { position: 1, .. }));

        let effect = h.cancel("A");
        assert!(matches!(effect, ReleaseEffect::Promoted(ref p) if p.token_id == "TKN-C"));
        assert_eq!(h.status("B"), TokenStatus::Confirmed);
        assert_eq!(h.status("C"), TokenStatus::Confirmed);
        assert_eq!(h.seq_no("C"), Some(3));

        let d = h.emergency("D");
        assert_eq!(d.displaced.unwrap().token_id, "TKN-B");
        assert_eq!(h.status("B"), TokenStatus::Waitlisted);
        assert_eq!(h.status("D"), TokenStatus::Confirmed);
        assert_eq!(h.confirmed(), vec!["C", "D"]);
        assert_eq!(h.waitlist(), vec!["B"]);
    }

    // ==========================================
    // 随机操作序列 (proptest)
    // ==========================================

    #[derive(Debug, Clone)]
    enum Op {
        Allocate(TokenSource),
        Emergency,
        Cancel(prop::sample::Index),
        NoShow(prop::sample::Index),
    }

    fn arb_source() -> impl Strategy<Value = TokenSource> {
        prop_oneof![
            Just(TokenSource::Emergency),
            Just(TokenSource::PaidPriority),
            Just(TokenSource::FollowUp),
            Just(TokenSource::OnlineBooking),
            Just(TokenSource::WalkIn),
        ]
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => arb_source().prop_map(Op::Allocate),
            2 => Just(Op::Emergency),
            1 => any::<prop::sample::Index>().prop_map(Op::Cancel),
            1 => any::<prop::sample::Index>().prop_map(Op::NoShow),
        ]
    }

    proptest! {
        #[test]
        fn test_invariants_hold_after_every_operation(
            capacity in 1u32..=5,
            ops in prop::collection::vec(arb_op(), 1..80),
        ) {
            let mut h = Harness::new(capacity);
            let mut names: Vec<String> = Vec::new();

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Allocate(source) => {
                        let name = format!("N{}", step);
                        h.allocate(&name, source);
                        names.push(name);
                    }
                    Op::Emergency => {
                        let name = format!("E{}", step);
                        h.emergency(&name);
                        names.push(name);
                    }
                    Op::Cancel(idx) if !names.is_empty() => {
                        let target = idx.get(&names).clone();
                        h.cancel(&target);
                    }
                    Op::NoShow(idx) if !names.is_empty() => {
                        let target = idx.get(&names).clone();
                        h.no_show(&target);
                    }
                    _ => {}
                }

                let ledger = &h.ctx.ledger;
                prop_assert!(h.ctx.verify().is_ok());
                prop_assert!(ledger.confirmed().len() as u32 <= capacity);
                // 有空余名额时候补必为空
                prop_assert!(
                    ledger.waitlist().is_empty() || ledger.confirmed().len() as u32 == capacity
                );
                let active = h
                    .ctx
                    .tokens
                    .values()
                    .filter(|t| matches!(t.status, TokenStatus::Confirmed | TokenStatus::Waitlisted))
                    .count();
                prop_assert_eq!(active, ledger.confirmed().len() + ledger.waitlist().len());
            }
        }
    }
}
