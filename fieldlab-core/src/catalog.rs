//! Field catalog — disjoint pools of known field names.
//!
//! The catalog answers three questions: which pool does a name belong to,
//! what does a fetch for a pool need to request (keys, price-adjustment
//! extras), and what is the current daily/quarterly vocabulary. Pool
//! unions are recomputed on every call because the factor pool grows at
//! runtime from a remote schema query.

use std::collections::BTreeSet;

/// Row-identity key present in every fetched table.
pub const SYMBOL_KEY: &str = "symbol";
/// Date key for daily tables.
pub const TRADE_DATE_KEY: &str = "trade_date";
/// Trading-status marker fetched alongside market-daily fields.
pub const TRADE_STATUS_FIELD: &str = "trade_status";
/// Reserved quarterly field: the date a report became public.
pub const ANN_DATE_FIELD: &str = "ann_date";
/// Date key for statement tables: the period-end a row describes.
pub const REPORT_DATE_KEY: &str = "report_date";
/// Daily membership mask for the view's primary index.
pub const INDEX_MEMBER_FIELD: &str = "index_member";
/// Daily weights for the view's primary index.
pub const INDEX_WEIGHT_FIELD: &str = "index_weight";

/// The fixed enumeration of field pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldPool {
    MarketDaily,
    ReferenceDaily,
    Income,
    BalanceSheet,
    CashFlow,
    FinIndicator,
    Group,
    Factor,
    CustomDaily,
    CustomQuarterly,
}

impl FieldPool {
    pub const ALL: [Self; 10] = [
        Self::MarketDaily,
        Self::ReferenceDaily,
        Self::Income,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::FinIndicator,
        Self::Group,
        Self::Factor,
        Self::CustomDaily,
        Self::CustomQuarterly,
    ];

    /// Pools whose fields live on the daily timeline.
    pub fn is_daily(self) -> bool {
        matches!(
            self,
            Self::MarketDaily
                | Self::ReferenceDaily
                | Self::Group
                | Self::Factor
                | Self::CustomDaily
        )
    }

    pub fn is_quarterly(self) -> bool {
        !self.is_daily()
    }
}

impl std::fmt::Display for FieldPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MarketDaily => "market_daily",
            Self::ReferenceDaily => "ref_daily",
            Self::Income => "income",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::FinIndicator => "fin_indicator",
            Self::Group => "group",
            Self::Factor => "factor",
            Self::CustomDaily => "custom_daily",
            Self::CustomQuarterly => "custom_quarterly",
        };
        f.write_str(name)
    }
}

/// Registry of known field names, partitioned into disjoint pools.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    market_daily: BTreeSet<String>,
    ref_daily: BTreeSet<String>,
    income: BTreeSet<String>,
    balance_sheet: BTreeSet<String>,
    cash_flow: BTreeSet<String>,
    fin_indicator: BTreeSet<String>,
    group: BTreeSet<String>,
    factor: BTreeSet<String>,
    custom_daily: BTreeSet<String>,
    custom_quarterly: BTreeSet<String>,
}

fn seed(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FieldCatalog {
    /// Catalog seeded with the server's documented field vocabulary.
    pub fn with_defaults() -> Self {
        Self {
            market_daily: seed(&[
                "open",
                "high",
                "low",
                "close",
                "vwap",
                "volume",
                "turnover",
                TRADE_STATUS_FIELD,
            ]),
            ref_daily: seed(&[
                "total_mv",
                "float_mv",
                "pb",
                "pe",
                "ps",
                "pcf_ocf",
                "turnover_ratio",
                "limit_status",
            ]),
            income: seed(&[
                "total_oper_rev",
                "oper_rev",
                "oper_cost",
                "total_profit",
                "income_tax",
                "net_profit",
                "ebit",
            ]),
            balance_sheet: seed(&[
                "total_assets",
                "total_liab",
                "total_equity",
                "monetary_cap",
                "inventories",
                "acct_rcv",
            ]),
            cash_flow: seed(&[
                "net_operate_cash_flow",
                "net_inc_cash_cash_equ",
                "cash_recp_sg_and_rs",
                "net_cash_flows_inv_act",
            ]),
            fin_indicator: seed(&[
                "roe",
                "roa",
                "bps",
                "eps_basic",
                "netprofit_margin",
                "grossprofit_margin",
                "current_ratio",
                "quick_ratio",
            ]),
            group: seed(&["sw1", "sw2", "sw3", "sw4", "zz1", "zz2"]),
            factor: BTreeSet::new(),
            custom_daily: BTreeSet::new(),
            custom_quarterly: BTreeSet::new(),
        }
    }

    fn pool(&self, pool: FieldPool) -> &BTreeSet<String> {
        match pool {
            FieldPool::MarketDaily => &self.market_daily,
            FieldPool::ReferenceDaily => &self.ref_daily,
            FieldPool::Income => &self.income,
            FieldPool::BalanceSheet => &self.balance_sheet,
            FieldPool::CashFlow => &self.cash_flow,
            FieldPool::FinIndicator => &self.fin_indicator,
            FieldPool::Group => &self.group,
            FieldPool::Factor => &self.factor,
            FieldPool::CustomDaily => &self.custom_daily,
            FieldPool::CustomQuarterly => &self.custom_quarterly,
        }
    }

    fn pool_mut(&mut self, pool: FieldPool) -> &mut BTreeSet<String> {
        match pool {
            FieldPool::MarketDaily => &mut self.market_daily,
            FieldPool::ReferenceDaily => &mut self.ref_daily,
            FieldPool::Income => &mut self.income,
            FieldPool::BalanceSheet => &mut self.balance_sheet,
            FieldPool::CashFlow => &mut self.cash_flow,
            FieldPool::FinIndicator => &mut self.fin_indicator,
            FieldPool::Group => &mut self.group,
            FieldPool::Factor => &mut self.factor,
            FieldPool::CustomDaily => &mut self.custom_daily,
            FieldPool::CustomQuarterly => &mut self.custom_quarterly,
        }
    }

    /// Which pool holds `name`; `None` means unknown to the catalog.
    ///
    /// Pools are disjoint, so the first hit is the only hit.
    pub fn classify(&self, name: &str) -> Option<FieldPool> {
        FieldPool::ALL
            .into_iter()
            .find(|p| self.pool(*p).contains(name))
    }

    /// Union of all daily pools, recomputed on every call.
    pub fn daily_union(&self) -> BTreeSet<String> {
        let mut union = BTreeSet::new();
        for pool in FieldPool::ALL.into_iter().filter(|p| p.is_daily()) {
            union.extend(self.pool(pool).iter().cloned());
        }
        union
    }

    /// Union of all quarterly pools, recomputed on every call.
    pub fn quarterly_union(&self) -> BTreeSet<String> {
        let mut union = BTreeSet::new();
        for pool in FieldPool::ALL.into_iter().filter(|p| p.is_quarterly()) {
            union.extend(self.pool(pool).iter().cloned());
        }
        union
    }

    /// Restrict `requested` to a pool's membership and augment with the
    /// keys a fetch needs.
    ///
    /// - Empty intersection short-circuits to an empty list, even with
    ///   `complement` set.
    /// - `complement` returns `requested` minus the pool instead.
    /// - `all_price` forces the adjustable price columns into any
    ///   market-daily request (turnover is never price-adjusted and is
    ///   excluded from the rule).
    /// - `include_keys` adds `symbol`; `trade_date` for daily pools plus
    ///   `trade_status` for market-daily; `ann_date` and `report_date` for
    ///   quarterly pools.
    pub fn resolve(
        &self,
        pool: FieldPool,
        requested: &[String],
        complement: bool,
        include_keys: bool,
        all_price: bool,
    ) -> Vec<String> {
        let members = self.pool(pool);
        let requested_set: BTreeSet<&str> = requested.iter().map(|s| s.as_str()).collect();
        let mut hit: BTreeSet<String> = requested_set
            .iter()
            .copied()
            .filter(|f| members.contains(*f))
            .map(str::to_string)
            .collect();
        if hit.is_empty() {
            return Vec::new();
        }

        if complement {
            hit = requested_set
                .iter()
                .copied()
                .filter(|f| !members.contains(*f))
                .map(str::to_string)
                .collect();
        }

        if pool == FieldPool::MarketDaily && all_price {
            for price in ["open", "high", "low", "close", "vwap"] {
                hit.insert(price.to_string());
            }
        }

        if include_keys {
            hit.insert(SYMBOL_KEY.to_string());
            if pool.is_daily() {
                hit.insert(TRADE_DATE_KEY.to_string());
                if pool == FieldPool::MarketDaily {
                    hit.insert(TRADE_STATUS_FIELD.to_string());
                }
            } else {
                hit.insert(ANN_DATE_FIELD.to_string());
                hit.insert(REPORT_DATE_KEY.to_string());
            }
        }

        hit.into_iter().collect()
    }

    /// Register factor fields discovered from a remote schema query.
    ///
    /// Returns how many names were actually new.
    pub fn register_factor_fields(&mut self, names: BTreeSet<String>) -> usize {
        let before = self.factor.len();
        self.factor.extend(names);
        self.factor.len() - before
    }

    /// Add names to one of the open-ended custom pools.
    pub fn register_custom(&mut self, quarterly: bool, names: &[String]) {
        let pool = if quarterly {
            FieldPool::CustomQuarterly
        } else {
            FieldPool::CustomDaily
        };
        self.pool_mut(pool).extend(names.iter().cloned());
    }
}
