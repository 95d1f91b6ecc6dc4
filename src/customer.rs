//! Customers: one-shot buyers manufactured by a recurring generator.
//!
//! Each generator tick creates a fixed number of attempts, files them into a
//! VIP or standard FIFO queue, and dispatches exactly one on its own thread,
//! VIP first. Attempts that are not dispatched wait for a later tick. Both
//! queues are bounded; when one is full the oldest attempt in it is dropped.

use crate::error::Result;
use crate::market::Market;
use crate::scheduler::CancelToken;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Customer {
    pub id: u32,
    pub vip: bool,
}

impl Customer {
    /// Random id in 1..=100, VIP with even odds
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Customer {
            id: rng.gen_range(1..=100),
            vip: rng.gen_bool(0.5),
        }
    }

    pub fn purchase_message(&self) -> String {
        if self.vip {
            format!("Buy 1 ticket from ticket pool [ID - {}] VIP Customer", self.id)
        } else {
            format!("Buy 1 ticket from ticket pool [ID - {}] Customer", self.id)
        }
    }
}

/// What one customer attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// System stopped or dispatch cancelled; nothing attempted
    Inactive,
    Purchased,
    SoldOut,
}

/// A single removal attempt against the pool
pub struct CustomerAgent {
    customer: Customer,
    market: Arc<Market>,
}

impl CustomerAgent {
    pub fn new(customer: Customer, market: Arc<Market>) -> Self {
        CustomerAgent { customer, market }
    }

    pub fn customer(&self) -> Customer {
        self.customer
    }

    pub fn attempt(&self) -> Result<PurchaseOutcome> {
        if !self.market.is_active()? {
            return Ok(PurchaseOutcome::Inactive);
        }

        let pool = self.market.pool();
        pool.refresh()?;

        if !pool.remove_ticket()? {
            return Ok(PurchaseOutcome::SoldOut);
        }

        if let Err(e) = self.market.ledger().append(&self.customer.purchase_message()) {
            tracing::warn!(customer_id = self.customer.id, error = %e, "Failed to record purchase");
        }

        Ok(PurchaseOutcome::Purchased)
    }

    fn run_once(&self, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            tracing::debug!(customer_id = self.customer.id, "Dispatch cancelled");
            return;
        }

        match self.attempt() {
            Ok(PurchaseOutcome::Purchased) => tracing::info!(
                customer_id = self.customer.id,
                vip = self.customer.vip,
                total = self.market.pool().snapshot().total_tickets,
                "Customer bought a ticket"
            ),
            Ok(PurchaseOutcome::SoldOut) => tracing::debug!(
                customer_id = self.customer.id,
                vip = self.customer.vip,
                "Pool empty, purchase skipped"
            ),
            Ok(PurchaseOutcome::Inactive) => {}
            Err(e) => tracing::error!(
                customer_id = self.customer.id,
                error = %e,
                "Customer attempt failed"
            ),
        }
    }

    /// Run the attempt on a fresh thread so a slow removal never delays the
    /// generator's next tick.
    pub fn spawn(self, cancel: CancelToken) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("customer-{}", self.customer.id))
            .spawn(move || self.run_once(&cancel))
    }
}

/// VIP and standard FIFO queues of waiting attempts
#[derive(Debug)]
pub struct WaitingQueues {
    vip: VecDeque<Customer>,
    standard: VecDeque<Customer>,
    limit: usize,
    dropped: u64,
}

impl WaitingQueues {
    pub fn new(limit: usize) -> Self {
        WaitingQueues {
            vip: VecDeque::new(),
            standard: VecDeque::new(),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    /// File a customer by status, returning the attempt evicted to make room
    pub fn enqueue(&mut self, customer: Customer) -> Option<Customer> {
        let queue = if customer.vip {
            &mut self.vip
        } else {
            &mut self.standard
        };

        let evicted = if queue.len() >= self.limit {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(customer);

        if evicted.is_some() {
            self.dropped += 1;
        }
        evicted
    }

    /// Next attempt to serve: oldest VIP, else oldest standard
    pub fn next(&mut self) -> Option<Customer> {
        self.vip.pop_front().or_else(|| self.standard.pop_front())
    }

    pub fn vip_len(&self) -> usize {
        self.vip.len()
    }

    pub fn standard_len(&self) -> usize {
        self.standard.len()
    }

    /// Attempts dropped so far because a queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

pub struct CustomerGenerator<R> {
    market: Arc<Market>,
    queues: WaitingQueues,
    per_tick: usize,
    rng: R,
    cancel: CancelToken,
}

impl<R: Rng> CustomerGenerator<R> {
    pub fn new(
        market: Arc<Market>,
        per_tick: usize,
        max_waiting: usize,
        rng: R,
        cancel: CancelToken,
    ) -> Self {
        CustomerGenerator {
            market,
            queues: WaitingQueues::new(max_waiting),
            per_tick,
            rng,
            cancel,
        }
    }

    pub fn queues(&self) -> &WaitingQueues {
        &self.queues
    }

    /// Manufacture this tick's attempts and pick the one to dispatch
    pub fn generate(&mut self) -> Option<Customer> {
        for _ in 0..self.per_tick {
            let customer = Customer::random(&mut self.rng);
            if let Some(evicted) = self.queues.enqueue(customer) {
                tracing::debug!(
                    customer_id = evicted.id,
                    vip = evicted.vip,
                    dropped = self.queues.dropped(),
                    "Waiting queue full, oldest attempt dropped"
                );
            }
        }
        self.queues.next()
    }

    /// One scheduled firing: generate and dispatch
    pub fn tick(&mut self) -> Option<JoinHandle<()>> {
        let customer = self.generate()?;
        tracing::trace!(
            customer_id = customer.id,
            vip = customer.vip,
            waiting_vip = self.queues.vip_len(),
            waiting_standard = self.queues.standard_len(),
            "Dispatching customer"
        );

        let agent = CustomerAgent::new(customer, self.market.clone());
        match agent.spawn(self.cancel.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(customer_id = customer.id, error = %e, "Failed to spawn customer");
                None
            }
        }
    }
}
