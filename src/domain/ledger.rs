// ==========================================
// 门诊号源分配系统 - 时段名单 (Slot Ledger)
// ==========================================
// 红线 (容量上限): |confirmed| ≤ capacity, 任何时刻 (含转换中途)
// 红线 (候补有序): 候补名单始终按 (优先级升序, 创建时间升序) 有序
// 红线 (成员唯一): 同一号源不得同时出现在确认名单与候补名单
// ==========================================
// 职责: 唯一的容量检查点; 所有调用方经由 insert_confirmed 继承防超约保证
// 说明: 名单只持有号源引用 (LedgerEntry), 号源实体由 SlotContext 持有
// ==========================================

use crate::domain::slot::TimeSlot;
use crate::domain::token::Token;
use crate::domain::types::{PriorityRank, TokenStatus, VictimPolicy};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// 名单错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// 违反容量上限 (调用逻辑缺陷,不应在正确运行时出现)
    #[error("时段容量已满, 禁止超约: slot_id={slot_id}, capacity={capacity}")]
    CapacityExceeded { slot_id: String, capacity: u32 },

    #[error("号源已在时段名单中: slot_id={slot_id}, token_id={token_id}")]
    DuplicateMembership { slot_id: String, token_id: String },

    #[error("号源不属于该时段: slot_id={slot_id}, token_id={token_id}")]
    ForeignToken { slot_id: String, token_id: String },

    #[error("时段名单数据不一致: slot_id={slot_id}, {message}")]
    Inconsistent { slot_id: String, message: String },
}

// ==========================================
// LedgerEntry - 名单条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub token_id: String,
    pub priority: PriorityRank,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn from_token(token: &Token) -> Self {
        Self {
            token_id: token.token_id.clone(),
            priority: token.priority,
            created_at: token.created_at,
        }
    }

    /// 候补排序键: 优先级优先, 同级按创建时间 FIFO
    fn queue_key(&self) -> (PriorityRank, DateTime<Utc>) {
        (self.priority, self.created_at)
    }
}

// ==========================================
// SlotLedger - 时段名单
// ==========================================
#[derive(Debug, Clone)]
pub struct SlotLedger {
    slot_id: String,
    capacity: u32,
    next_seq_no: u32,
    confirmed: Vec<LedgerEntry>, // 插入顺序 = 分配顺序
    waitlist: Vec<LedgerEntry>,  // 始终有序
}

impl SlotLedger {
    /// 创建空名单
    pub fn new(slot_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            slot_id: slot_id.into(),
            capacity,
            next_seq_no: 1,
            confirmed: Vec::new(),
            waitlist: Vec::new(),
        }
    }

    /// 从持久化数据恢复名单
    ///
    /// # 返回
    /// - Err(Inconsistent): 持久化数据本身违反名单不变量
    pub fn restore(
        slot_id: impl Into<String>,
        capacity: u32,
        next_seq_no: u32,
        confirmed: Vec<LedgerEntry>,
        waitlist: Vec<LedgerEntry>,
    ) -> Result<Self, LedgerError> {
        let ledger = Self {
            slot_id: slot_id.into(),
            capacity,
            next_seq_no: next_seq_no.max(1),
            confirmed,
            waitlist,
        };
        ledger.check_invariants()?;
        Ok(ledger)
    }

    // ==========================================
    // 只读访问
    // ==========================================

    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn next_seq_no(&self) -> u32 {
        self.next_seq_no
    }

    pub fn confirmed(&self) -> &[LedgerEntry] {
        &self.confirmed
    }

    pub fn waitlist(&self) -> &[LedgerEntry] {
        &self.waitlist
    }

    /// 剩余容量 = capacity - |confirmed| (容量上限保证不会为负)
    pub fn available_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.confirmed.len() as u32)
    }

    pub fn contains(&self, token_id: &str) -> bool {
        self.confirmed.iter().any(|e| e.token_id == token_id)
            || self.waitlist.iter().any(|e| e.token_id == token_id)
    }

    /// 候补位置 (1 起)
    pub fn waitlist_position(&self, token_id: &str) -> Option<usize> {
        self.waitlist
            .iter()
            .position(|e| e.token_id == token_id)
            .map(|idx| idx + 1)
    }

    // ==========================================
    // 变更操作
    // ==========================================

    /// 插入确认名单
    ///
    /// 前置条件: available_capacity() > 0, 否则返回 CapacityExceeded 且不做任何变更
    ///
    /// # 返回
    /// 分配的就诊序号 (1 起, 时段内单调递增)
    pub fn insert_confirmed(&mut self, token: &mut Token) -> Result<u32, LedgerError> {
        self.guard_new_member(token)?;
        if self.available_capacity() == 0 {
            return Err(LedgerError::CapacityExceeded {
                slot_id: self.slot_id.clone(),
                capacity: self.capacity,
            });
        }

        let seq_no = self.next_seq_no;
        self.next_seq_no += 1;
        self.confirmed.push(LedgerEntry::from_token(token));

        token.status = TokenStatus::Confirmed;
        token.seq_no = Some(seq_no);
        Ok(seq_no)
    }

    /// 有序插入候补名单 (不是追加后再排序)
    ///
    /// 同优先级同时间戳的条目, 新插入者排在已有条目之后
    ///
    /// # 返回
    /// 插入后的候补位置 (1 起)
    pub fn insert_waitlisted(&mut self, token: &mut Token) -> Result<usize, LedgerError> {
        self.guard_new_member(token)?;

        let entry = LedgerEntry::from_token(token);
        let key = entry.queue_key();
        let index = self.waitlist.partition_point(|e| e.queue_key() <= key);
        self.waitlist.insert(index, entry);

        token.status = TokenStatus::Waitlisted;
        token.seq_no = None;
        token.estimated_time = None;
        Ok(index + 1)
    }

    /// 从确认名单移除 (幂等: 不存在时返回 false)
    pub fn remove_confirmed(&mut self, token_id: &str) -> bool {
        match self.confirmed.iter().position(|e| e.token_id == token_id) {
            Some(idx) => {
                self.confirmed.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 从候补名单移除 (幂等: 不存在时返回 false)
    pub fn remove_waitlisted(&mut self, token_id: &str) -> bool {
        match self.waitlist.iter().position(|e| e.token_id == token_id) {
            Some(idx) => {
                self.waitlist.remove(idx);
                true
            }
            None => false,
        }
    }

    /// 弹出候补队首 (最高优先级、最早创建); 空名单返回 None
    pub fn pop_highest_waitlisted(&mut self) -> Option<LedgerEntry> {
        if self.waitlist.is_empty() {
            None
        } else {
            Some(self.waitlist.remove(0))
        }
    }

    /// 确认名单中优先级最低的号源
    ///
    /// 优先级数值最大者; 同级时按策略决定:
    /// - MostRecentlyAdmitted: 创建时间最晚者 (再按分配顺序最晚者)
    /// - EarliestAdmitted: 创建时间最早者 (再按分配顺序最早者)
    pub fn lowest_priority_confirmed(&self, policy: VictimPolicy) -> Option<&LedgerEntry> {
        self.confirmed
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.priority.cmp(&b.priority).then_with(|| match policy {
                    VictimPolicy::MostRecentlyAdmitted => {
                        a.created_at.cmp(&b.created_at).then(ia.cmp(ib))
                    }
                    VictimPolicy::EarliestAdmitted => {
                        b.created_at.cmp(&a.created_at).then(ib.cmp(ia))
                    }
                })
            })
            .map(|(_, entry)| entry)
    }

    // ==========================================
    // 不变量校验
    // ==========================================

    /// 校验名单不变量: 容量上限 / 候补有序 / 成员唯一
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        if self.confirmed.len() as u32 > self.capacity {
            return Err(self.inconsistent(format!(
                "确认人数超出容量: {}/{}",
                self.confirmed.len(),
                self.capacity
            )));
        }

        if let Some(pair) = self
            .waitlist
            .windows(2)
            .find(|w| w[0].queue_key() > w[1].queue_key())
        {
            return Err(self.inconsistent(format!(
                "候补名单顺序错误: {} 排在 {} 之前",
                pair[0].token_id, pair[1].token_id
            )));
        }

        let mut seen = HashSet::new();
        for entry in self.confirmed.iter().chain(self.waitlist.iter()) {
            if !seen.insert(entry.token_id.as_str()) {
                return Err(self.inconsistent(format!("号源重复出现: {}", entry.token_id)));
            }
        }

        Ok(())
    }

    fn guard_new_member(&self, token: &Token) -> Result<(), LedgerError> {
        if token.slot_id != self.slot_id {
            return Err(LedgerError::ForeignToken {
                slot_id: self.slot_id.clone(),
                token_id: token.token_id.clone(),
            });
        }
        if self.contains(&token.token_id) {
            return Err(LedgerError::DuplicateMembership {
                slot_id: self.slot_id.clone(),
                token_id: token.token_id.clone(),
            });
        }
        Ok(())
    }

    fn inconsistent(&self, message: String) -> LedgerError {
        LedgerError::Inconsistent {
            slot_id: self.slot_id.clone(),
            message,
        }
    }
}

// ==========================================
// SlotContext - 单次调用的时段工作集
// ==========================================
// 在时段锁内加载 → 变更 → 整体提交; 失败时直接丢弃,不会留下部分变更
#[derive(Debug, Clone)]
pub struct SlotContext {
    pub slot: TimeSlot,
    pub ledger: SlotLedger,
    pub tokens: HashMap<String, Token>, // 该时段全部号源 (含终态)
}

impl SlotContext {
    /// 空时段工作集
    pub fn new(slot: TimeSlot) -> Self {
        let ledger = SlotLedger {
            slot_id: slot.slot_id.clone(),
            capacity: slot.max_capacity,
            next_seq_no: slot.next_seq_no.max(1),
            confirmed: Vec::new(),
            waitlist: Vec::new(),
        };
        Self {
            slot,
            ledger,
            tokens: HashMap::new(),
        }
    }

    /// 由持久化号源重建工作集
    ///
    /// # 参数
    /// - `tokens`: 按持久化候补位置排好序的号源列表
    pub fn from_tokens(slot: TimeSlot, tokens: Vec<Token>) -> Result<Self, LedgerError> {
        let mut confirmed: Vec<&Token> = tokens
            .iter()
            .filter(|t| t.status == TokenStatus::Confirmed)
            .collect();
        confirmed.sort_by_key(|t| t.seq_no.unwrap_or(u32::MAX));

        if let Some(max_seq) = confirmed.iter().filter_map(|t| t.seq_no).max() {
            if max_seq >= slot.next_seq_no {
                return Err(LedgerError::Inconsistent {
                    slot_id: slot.slot_id.clone(),
                    message: format!("序号 {} 不小于 next_seq_no {}", max_seq, slot.next_seq_no),
                });
            }
        }

        let confirmed = confirmed.into_iter().map(LedgerEntry::from_token).collect();
        let waitlist = tokens
            .iter()
            .filter(|t| t.status == TokenStatus::Waitlisted)
            .map(LedgerEntry::from_token)
            .collect();

        let ledger = SlotLedger::restore(
            slot.slot_id.clone(),
            slot.max_capacity,
            slot.next_seq_no,
            confirmed,
            waitlist,
        )?;

        let tokens = tokens
            .into_iter()
            .map(|t| (t.token_id.clone(), t))
            .collect();

        Ok(Self {
            slot,
            ledger,
            tokens,
        })
    }

    /// 校验名单与号源状态一致 (名单不变量 + 状态对应)
    pub fn verify(&self) -> Result<(), LedgerError> {
        self.ledger.check_invariants()?;

        for token in self.tokens.values() {
            let in_confirmed = self
                .ledger
                .confirmed()
                .iter()
                .any(|e| e.token_id == token.token_id);
            let in_waitlist = self.ledger.waitlist_position(&token.token_id).is_some();

            let consistent = match token.status {
                TokenStatus::Confirmed => in_confirmed && !in_waitlist,
                TokenStatus::Waitlisted => in_waitlist && !in_confirmed,
                TokenStatus::Cancelled | TokenStatus::NoShow => !in_confirmed && !in_waitlist,
            };
            if !consistent {
                return Err(LedgerError::Inconsistent {
                    slot_id: self.slot.slot_id.clone(),
                    message: format!(
                        "号源状态与名单不符: token_id={}, status={}",
                        token.token_id, token.status
                    ),
                });
            }
        }

        Ok(())
    }
}
