//! Command-line front-end for the booking core.
//!
//! Drives one practitioner's availability, the calendar view, the hourly
//! picker and bookings against in-memory stores and the sandbox gateway.

use anyhow::Context;
use carebook::config::{self, Config};
use carebook::models::{parse_wall_clock, AvailabilityRule, DayOfWeek};
use carebook::{
    AvailabilityService, BookingCoordinator, BookingErrorKind, BookingRequest, InMemoryAvailabilityStore,
    InMemorySessionStore, PaymentDetails, SandboxGateway,
};
use chrono::{Duration, Local, NaiveDate};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

struct BookingCli {
    practitioner_id: Uuid,
    rules: Arc<InMemoryAvailabilityStore>,
    sessions: Arc<InMemorySessionStore>,
    availability: AvailabilityService,
    coordinator: BookingCoordinator,
    running: bool,
}

impl BookingCli {
    fn new(config: &Config) -> Self {
        let rules = Arc::new(InMemoryAvailabilityStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let availability = AvailabilityService::new(rules.clone(), sessions.clone(), config.booking.horizon_days);
        let coordinator = BookingCoordinator::new(
            sessions.clone(),
            Arc::new(SandboxGateway::new()),
            config.pricing.policy(),
            config.booking.clone(),
        );

        BookingCli {
            practitioner_id: Uuid::new_v4(),
            rules,
            sessions,
            availability,
            coordinator,
            running: true,
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       TELE-HEALTH BOOKING");
        println!("{}", "=".repeat(60));
        println!("Practitioner: {}", self.practitioner_id);
    }

    fn print_menu(&self) {
        println!("\n--- Main Menu ---");
        println!("1. Add weekly availability");
        println!("2. Enable/disable availability");
        println!("3. View calendar");
        println!("4. View free hours on a date");
        println!("5. Book a session");
        println!("6. Cancel session");
        println!("7. Run demo");
        println!("8. Exit");
        println!("{}", "-".repeat(20));
    }

    fn get_input(&self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        io::stdout().flush().ok();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return default.unwrap_or("").to_string();
        }
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    fn get_int_input(&self, prompt: &str, default: Option<i64>) -> i64 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i64>() {
                return value;
            }
            println!("Please enter a valid number");
        }
    }

    fn get_date_input(&self, prompt: &str) -> Option<NaiveDate> {
        let tomorrow = (Local::now() + Duration::days(1)).date_naive();
        let input = self.get_input(prompt, Some(&tomorrow.format("%Y-%m-%d").to_string()));
        match NaiveDate::parse_from_str(&input, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                println!("Dates look like 2024-01-31");
                None
            }
        }
    }

    fn add_rule(&mut self) {
        println!("\n--- Add Weekly Availability ---");

        let day = self.get_input("Day (e.g. Monday, LUNES, MIÉRCOLES)", Some("Monday"));
        let start = self.get_input("Start time", Some("09:00"));
        let end = self.get_input("End time", Some("13:00"));

        match AvailabilityRule::from_labels(self.practitioner_id, &day, &start, &end) {
            Ok(rule) => match self.rules.add_rule(rule) {
                Ok(rule) => println!(
                    "\nAdded {} {} - {}",
                    rule.day_of_week.name(),
                    rule.start_time.format("%H:%M"),
                    rule.end_time.format("%H:%M")
                ),
                Err(e) => println!("Error saving rule: {}", e),
            },
            Err(e) => println!("Error creating rule: {}", e),
        }
    }

    async fn toggle_rule(&mut self) {
        use carebook::AvailabilityStore;

        let rules = match self.rules.rules_for(self.practitioner_id).await {
            Ok(rules) => rules,
            Err(e) => {
                println!("Error loading rules: {}", e);
                return;
            }
        };
        if rules.is_empty() {
            println!("\nNo availability defined yet (option 1)");
            return;
        }

        println!("\n--- Weekly Availability ---");
        for (i, rule) in rules.iter().enumerate() {
            println!(
                "  {}. {:<10} {} - {} [{}]",
                i + 1,
                rule.day_of_week.name(),
                rule.start_time.format("%H:%M"),
                rule.end_time.format("%H:%M"),
                if rule.active { "active" } else { "disabled" }
            );
        }

        let choice = self.get_int_input("Toggle which rule (0 to skip)", Some(0));
        if choice < 1 || choice as usize > rules.len() {
            return;
        }
        let rule = &rules[choice as usize - 1];
        match self.rules.set_active(rule.id, !rule.active) {
            Ok(updated) => println!("Rule is now {}", if updated.active { "active" } else { "disabled" }),
            Err(e) => println!("Error updating rule: {}", e),
        }
    }

    async fn view_calendar(&self) {
        let today = Local::now().date_naive();
        let partition = match self.availability.calendar(self.practitioner_id, today).await {
            Ok(partition) => partition,
            Err(e) => {
                println!("Error loading calendar: {}", e);
                return;
            }
        };

        if partition.is_empty() {
            println!("\nNo availability in the coming weeks");
            return;
        }

        let mut all: Vec<_> = partition
            .free
            .iter()
            .map(|slot| (slot, "free"))
            .chain(partition.occupied.iter().map(|slot| (slot, "booked")))
            .collect();
        all.sort_by_key(|(slot, _)| (slot.start, slot.source_rule_id));

        println!(
            "\n--- Calendar ({} free, {} with bookings) ---",
            partition.free.len(),
            partition.occupied.len()
        );
        let mut current_date = None;
        for (slot, label) in all {
            let slot_date = slot.date();
            if Some(slot_date) != current_date {
                current_date = Some(slot_date);
                println!("\n{} ({}):", slot_date.format("%Y-%m-%d"), DayOfWeek::of(slot_date).label_es());
            }
            println!(
                "  {} - {}  {}",
                slot.start.format("%H:%M"),
                slot.end.format("%H:%M"),
                label
            );
        }
    }

    async fn view_hours(&self) {
        let Some(date) = self.get_date_input("Date") else {
            return;
        };

        match self.availability.time_picker(self.practitioner_id, date).await {
            Ok(hours) if hours.is_empty() => println!("\nNo free hours on {}", date),
            Ok(hours) => {
                println!("\nFree hours on {}:", date.format("%A, %Y-%m-%d"));
                for slot in hours {
                    println!("  {} - {}", slot.start.format("%H:%M"), slot.end.format("%H:%M"));
                }
            }
            Err(e) => println!("Error loading hours: {}", e),
        }
    }

    fn read_payment(&self) -> PaymentDetails {
        println!("\nPayment methods:");
        println!("  1. Card");
        println!("  2. Wallet");
        println!("  3. Cash (pay at the visit)");
        println!("  4. Bank transfer");

        match self.get_int_input("Select method", Some(3)) {
            1 => PaymentDetails::Card {
                holder: self.get_input("Card holder", None),
                number: self.get_input("Card number", Some("4111111111111111")),
                expiry_month: self.get_int_input("Expiry month", Some(12)) as u32,
                expiry_year: self.get_int_input("Expiry year", Some(2030)) as u32,
                cvv: self.get_input("CVV", None),
            },
            2 => PaymentDetails::Wallet {
                account: self.get_input("Wallet account", None),
            },
            4 => PaymentDetails::BankTransfer {
                reference: self.get_input("Transfer reference", None),
            },
            _ => PaymentDetails::Cash,
        }
    }

    async fn book_session(&mut self) {
        println!("\n--- Book a Session ---");

        let Some(date) = self.get_date_input("Date") else {
            return;
        };
        let start_time = self.get_input("Start time", Some("09:00"));
        if let Err(e) = parse_wall_clock(&start_time) {
            println!("{}", e);
            return;
        }
        let duration_minutes = self.get_int_input("Duration (minutes)", Some(60));
        let quote = match self.coordinator.pricing().quote(self.practitioner_id, duration_minutes) {
            Ok(quote) => quote,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };
        println!(
            "Price: {:.2} + {:.2} tax = {:.2}",
            quote.amount as f64 / 100.0,
            quote.tax_amount as f64 / 100.0,
            quote.total_amount as f64 / 100.0
        );
        let payment = self.read_payment();

        let request = BookingRequest {
            practitioner_id: self.practitioner_id,
            patient_id: Uuid::new_v4(),
            date,
            start_time,
            duration_minutes,
            payment,
        };

        match self.coordinator.book_slot(request).await {
            Ok(receipt) => {
                println!("\nBooked session {}", receipt.session.id);
                println!(
                    "  {} {} - {}",
                    receipt.session.date,
                    receipt.session.start_time.format("%H:%M"),
                    receipt.session.end_time.format("%H:%M")
                );
                println!("  Payment {} ({})", receipt.payment.id, receipt.payment.status.name());
            }
            Err(e) => match e.kind() {
                BookingErrorKind::SlotConflict => {
                    println!("\nThat time was just taken. Please refresh and pick another slot.")
                }
                BookingErrorKind::PartialFailure => {
                    println!("\nYour payment was taken but the booking failed. Please contact support.");
                    println!("  {}", e);
                }
                _ => println!("\nBooking failed: {}", e),
            },
        }
    }

    async fn cancel_session(&mut self) {
        let sessions = match self.sessions.all_sessions() {
            Ok(sessions) => sessions.into_iter().filter(|s| s.is_scheduled()).collect::<Vec<_>>(),
            Err(e) => {
                println!("Error loading sessions: {}", e);
                return;
            }
        };
        if sessions.is_empty() {
            println!("\nNo scheduled sessions");
            return;
        }

        println!("\n--- Scheduled Sessions ---");
        for (i, session) in sessions.iter().enumerate() {
            println!(
                "  {}. {} {} - {}",
                i + 1,
                session.date,
                session.start_time.format("%H:%M"),
                session.end_time.format("%H:%M")
            );
        }

        let choice = self.get_int_input("Cancel which session (0 to skip)", Some(0));
        if choice < 1 || choice as usize > sessions.len() {
            return;
        }
        match self.coordinator.cancel_session(sessions[choice as usize - 1].id).await {
            Ok(session) => println!("Cancelled session {}", session.id),
            Err(e) => println!("Error cancelling session: {}", e),
        }
    }

    async fn run_demo(&mut self) {
        println!("\n--- Demo ---");

        for (day, start, end) in [("LUNES", "08:00", "12:00"), ("MIÉRCOLES", "14:00", "17:30"), ("viernes", "09:00", "11:00")] {
            if let Ok(rule) = AvailabilityRule::from_labels(self.practitioner_id, day, start, end) {
                self.rules.add_rule(rule).ok();
            }
        }
        println!("Added Monday, Wednesday and Friday availability");

        let today = Local::now().date_naive();
        let next_monday = (1..=7)
            .map(|offset| today + Duration::days(offset))
            .find(|date| DayOfWeek::of(*date) == DayOfWeek::Monday)
            .unwrap_or(today);

        let attempts = [
            ("09:00", 60, PaymentDetails::Cash),
            ("09:30", 30, PaymentDetails::Wallet { account: "demo@wallet".to_string() }),
            ("10:00", 60, PaymentDetails::BankTransfer { reference: "DEMO-1".to_string() }),
        ];
        for (start_time, duration_minutes, payment) in attempts {
            let request = BookingRequest {
                practitioner_id: self.practitioner_id,
                patient_id: Uuid::new_v4(),
                date: next_monday,
                start_time: start_time.to_string(),
                duration_minutes,
                payment,
            };
            match self.coordinator.book_slot(request).await {
                Ok(receipt) => println!(
                    "  {} {}: booked ({} payment)",
                    next_monday,
                    start_time,
                    receipt.payment.status.name()
                ),
                Err(e) => println!("  {} {}: {}", next_monday, start_time, e),
            }
        }

        self.view_calendar().await;
    }

    async fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();
            let choice = self.get_input("Enter choice", None);

            match choice.as_str() {
                "1" => self.add_rule(),
                "2" => self.toggle_rule().await,
                "3" => self.view_calendar().await,
                "4" => self.view_hours().await,
                "5" => self.book_session().await,
                "6" => self.cancel_session().await,
                "7" => self.run_demo().await,
                "8" => {
                    println!("\nGoodbye!");
                    self.running = false;
                }
                _ => println!("\nInvalid choice. Please try again."),
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carebook::telemetry::init()?;
    let config = config::init().context("Failed to load configuration")?;
    info!(
        app = %config.app.name,
        horizon_days = config.booking.horizon_days,
        "Configuration loaded"
    );

    let mut cli = BookingCli::new(config);
    cli.run().await;
    Ok(())
}
