//! Shop command - interactive shell driving a signed-in kiosk session.
//!
//! Every line typed counts as a key-down activity signal. `hide` and `show`
//! stand in for the page losing and regaining visibility; while hidden,
//! input is not delivered to the session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, Term, style};
use kiosk_auth::{AuthSessionController, Credentials, Registration, StoredUserDirectory};
use kiosk_session::{
    ActivitySignal, SessionEvent, SessionOrchestrator, SignalHub, TimerConfig, TokioScheduler,
    Visibility,
};
use kiosk_store::{CacheCoordinator, DeliveryInfo, FileStore, KeyValueStore, PaymentMethod};
use kiosk_types::{Clock, SystemClock, UserId};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use tracing::warn;

use super::Context;

/// Arguments for the shop command.
#[derive(Args, Debug)]
pub struct ShopArgs {
    /// Inactivity timeout in milliseconds (overrides config)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Warning lead time in milliseconds (overrides config)
    #[arg(long)]
    pub warning_ms: Option<u64>,

    /// Simulated sign-in latency in milliseconds (overrides config)
    #[arg(long)]
    pub auth_delay_ms: Option<u64>,
}

/// Items on sale: id, display name, unit price in cents.
const CATALOG: &[(&str, &str, u64)] = &[
    ("tee", "Classic Tee", 1_999),
    ("hoodie", "Zip Hoodie", 4_999),
    ("cap", "Baseball Cap", 1_500),
    ("socks", "Crew Socks (3 pack)", 999),
    ("jacket", "Rain Jacket", 8_900),
];

fn price_of(item_id: &str) -> Option<u64> {
    CATALOG
        .iter()
        .find(|(id, _, _)| *id == item_id)
        .map(|(_, _, price)| *price)
}

fn money(cents: u64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// Run the shop command.
pub async fn run(args: ShopArgs, ctx: &Context) -> Result<()> {
    let loaded = kiosk_config::load_config(None)?;
    for w in &loaded.warnings {
        warn!("{}", w);
    }
    let config = loaded.config;

    let session_config = config.session();
    let timer_config = TimerConfig::new(
        args.timeout_ms.unwrap_or(session_config.timeout_ms),
        args.warning_ms.unwrap_or(session_config.warning_ms),
    )?;
    let delay =
        Duration::from_millis(args.auth_delay_ms.unwrap_or(config.auth().simulated_delay_ms));
    let data_dir = ctx
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage().effective_data_dir());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&data_dir));
    let hub = Arc::new(SignalHub::new());
    let scheduler =
        TokioScheduler::current().context("shop shell needs a running tokio runtime")?;

    let session =
        SessionOrchestrator::new(Arc::clone(&clock), Arc::new(scheduler), Arc::clone(&hub));
    let directory =
        StoredUserDirectory::new(Arc::clone(&backend), Arc::clone(&clock)).with_delay(delay);
    let caches = Arc::new(CacheCoordinator::new(Arc::clone(&backend), clock));
    let auth = AuthSessionController::new(
        Arc::new(directory),
        backend,
        caches,
        session,
        timer_config,
    );

    let mut shell = Shell::new(auth, hub, ctx.verbose)?;
    shell.print_welcome(&data_dir.display().to_string());
    shell.run().await
}

/// Shell state.
struct Shell {
    auth: AuthSessionController,
    hub: Arc<SignalHub>,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

enum ControlFlow {
    Continue,
    Exit,
}

impl Shell {
    fn new(auth: AuthSessionController, hub: Arc<SignalHub>, verbose: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();
        let editor = Editor::with_config(config)?;

        let term = Term::stdout();
        let notices = term.clone();
        auth.session().subscribe(move |event| {
            let line = match event {
                SessionEvent::Warning { remaining_ms } => format!(
                    "{} Session expires in {}s without activity",
                    style("!").yellow().bold(),
                    remaining_ms.div_ceil(1000)
                ),
                SessionEvent::Expired => format!(
                    "{} Signed out due to inactivity",
                    style("!").red().bold()
                ),
            };
            let _ = notices.write_line(&line);
        });

        Ok(Self {
            auth,
            hub,
            editor,
            term,
            verbose,
        })
    }

    async fn run(&mut self) -> Result<()> {
        if let Some(principal) = self.auth.initialize_from_persisted_principal() {
            println!("Welcome back, {}.", style(&principal.name).bold());
            println!();
        }

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }

                    match self.handle_line(&line).await {
                        Ok(ControlFlow::Continue) => {}
                        Ok(ControlFlow::Exit) => break,
                        Err(e) => self.print_error(&format!("{e:#}")),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type quit to exit)");
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.auth.dispose();
        self.auth.session().disable();
        self.print_dim("Goodbye!");
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<ControlFlow> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        let args = &parts[1..];

        if cmd == "show" {
            self.hub.set_visibility(Visibility::Visible);
            self.print_dim("Page visible");
            return Ok(ControlFlow::Continue);
        }
        if self.hub.visibility() == Visibility::Hidden {
            self.print_dim("Page is hidden; type show first");
            return Ok(ControlFlow::Continue);
        }
        self.hub.dispatch_activity(ActivitySignal::KeyDown);

        match cmd {
            "quit" | "q" | "exit" => return Ok(ControlFlow::Exit),
            "help" | "h" | "?" => self.print_help(),
            "clear" | "cls" => self.term.clear_screen()?,
            "hide" => {
                self.hub.set_visibility(Visibility::Hidden);
                self.print_dim("Page hidden");
            }
            "login" => match args {
                [email, password] => {
                    self.print_dim("Signing in...");
                    let principal = self.auth.login(Credentials::new(*email, *password)).await?;
                    self.print_success(&format!("Signed in as {}", principal.name));
                }
                _ => self.print_usage("login <email> <password>"),
            },
            "register" => match args {
                [email, password, name @ ..] if !name.is_empty() => {
                    self.print_dim("Creating account...");
                    let registration = Registration::new(name.join(" "), *email, *password);
                    let principal = self.auth.register(registration).await?;
                    self.print_success(&format!("Welcome, {}", principal.name));
                }
                _ => self.print_usage("register <email> <password> <name>"),
            },
            "logout" => {
                if self.auth.logout() {
                    self.print_success("Signed out");
                } else {
                    self.print_dim("Not signed in");
                }
            }
            "whoami" => self.print_whoami(),
            "delete-account" => {
                self.auth.delete_account().await?;
                self.print_success("Account deleted");
            }
            "catalog" => self.print_catalog(),
            "add" => match args {
                [item, size] | [item, size, _] => {
                    let quantity = match args.get(2) {
                        Some(q) => q.parse::<u32>().context("quantity must be a number")?,
                        None => 1,
                    };
                    self.ensure_known(item)?;
                    let user = self.require_user()?;
                    let total = self.auth.caches().add_to_cart(&user, item, size, quantity)?;
                    self.print_success(&format!("{item} ({size}) x{total} in cart"));
                }
                _ => self.print_usage("add <item> <size> [quantity]"),
            },
            "set" => match args {
                [item, size, quantity] => {
                    let quantity = quantity.parse::<u32>().context("quantity must be a number")?;
                    let user = self.require_user()?;
                    self.auth
                        .caches()
                        .update_cart_quantity(&user, item, size, quantity)?;
                    self.print_cart();
                }
                _ => self.print_usage("set <item> <size> <quantity>"),
            },
            "remove" => match args {
                [item, size] => {
                    let user = self.require_user()?;
                    if self.auth.caches().remove_from_cart(&user, item, size)? {
                        self.print_success(&format!("Removed {item} ({size})"));
                    } else {
                        self.print_dim("Not in cart");
                    }
                }
                _ => self.print_usage("remove <item> <size>"),
            },
            "cart" => self.print_cart(),
            "checkout" => {
                let payment = match args {
                    ["card", last4] => PaymentMethod::Card {
                        last4: last4.to_string(),
                    },
                    ["cod"] => PaymentMethod::CashOnDelivery,
                    _ => {
                        self.print_usage("checkout card <last4> | checkout cod");
                        return Ok(ControlFlow::Continue);
                    }
                };
                let user = self.require_user()?;
                let delivery = self.prompt_delivery()?;
                let order = self
                    .auth
                    .caches()
                    .checkout(&user, delivery, payment, price_of)?;
                self.print_success(&format!(
                    "Order {} placed, total {}",
                    order.id,
                    money(order.total_amount)
                ));
                println!(
                    "  estimated delivery {}",
                    order.estimated_delivery_at.format("%Y-%m-%d")
                );
            }
            "orders" => self.print_orders(),
            "remaining" => self.print_remaining(),
            "stay" => {
                if self.auth.session().reset_timer() {
                    self.print_success("Staying signed in");
                }
                self.print_remaining();
            }
            "" => self.print_dim("Type help for available commands"),
            _ => {
                self.print_error(&format!("Unknown command: {}", cmd));
                self.print_dim("Type help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn require_user(&self) -> Result<UserId> {
        self.auth
            .principal()
            .map(|p| p.id)
            .ok_or_else(|| anyhow::anyhow!("Sign in first"))
    }

    fn ensure_known(&self, item_id: &str) -> Result<()> {
        if price_of(item_id).is_none() {
            anyhow::bail!("Unknown item: {item_id} (see catalog)");
        }
        Ok(())
    }

    fn prompt_delivery(&mut self) -> Result<DeliveryInfo> {
        let name = self.prompt_field("Name")?;
        let address = self.prompt_field("Address")?;
        let city = self.prompt_field("City")?;
        let postal_code = self.prompt_field("Postal code")?;
        let phone = self.prompt_field("Phone (optional)")?;
        Ok(DeliveryInfo {
            name,
            address,
            city,
            postal_code,
            phone: (!phone.is_empty()).then_some(phone),
        })
    }

    fn prompt_field(&mut self, label: &str) -> Result<String> {
        let value = self.editor.readline(&format!("  {}: ", label))?;
        self.hub.dispatch_activity(ActivitySignal::KeyDown);
        Ok(value.trim().to_string())
    }

    fn format_prompt(&self) -> String {
        match self.auth.principal() {
            Some(principal) => format!(
                "{} ",
                style(format!(
                    "kiosk({}, {})>",
                    principal.name,
                    self.auth.caches().cart_item_count()
                ))
                .cyan()
                .bold()
            ),
            None => format!("{} ", style("kiosk>").cyan().bold()),
        }
    }

    fn print_welcome(&self, data_dir: &str) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Kiosk Shop").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("{}", dim.apply_to(format!("Data: {}", data_dir)));
        println!("{}", dim.apply_to("Type help for commands, Ctrl+D to exit."));
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        for (usage, about) in [
            ("login <email> <password>", "Sign in"),
            ("register <email> <password> <name>", "Create an account"),
            ("logout", "Sign out"),
            ("whoami", "Show the signed-in user"),
            ("delete-account", "Delete the account and its data"),
            ("catalog", "List items for sale"),
            ("add <item> <size> [qty]", "Add to cart"),
            ("set <item> <size> <qty>", "Set a quantity (0 removes)"),
            ("remove <item> <size>", "Remove from cart"),
            ("cart", "Show the cart"),
            ("checkout card <last4> | cod", "Place an order"),
            ("orders", "Show order history"),
            ("remaining", "Time left before expiry"),
            ("stay", "Keep the session alive"),
            ("hide / show", "Simulate page visibility"),
            ("quit", "Exit the shell"),
        ] {
            println!("  {:<36} {}", style(usage).cyan(), dim.apply_to(about));
        }
        println!();
    }

    fn print_whoami(&self) {
        match self.auth.principal() {
            Some(p) => {
                println!("{} <{}>", style(&p.name).bold(), p.email);
                if self.verbose {
                    self.print_dim(&format!("id: {}", p.id));
                }
            }
            None if self.auth.expired_due_to_inactivity() => {
                self.print_dim("Not signed in (session expired due to inactivity)")
            }
            None => self.print_dim("Not signed in"),
        }
    }

    fn print_catalog(&self) {
        for (id, name, price) in CATALOG {
            println!("  {:<8} {:<22} {}", style(id).cyan(), name, money(*price));
        }
    }

    fn print_cart(&self) {
        let Some(cart) = self.auth.caches().cart() else {
            self.print_dim("Sign in to see your cart");
            return;
        };
        if cart.is_empty() {
            self.print_dim("Cart is empty");
            return;
        }

        let mut total = 0u64;
        for line in cart.lines() {
            let unit = price_of(line.item_id).unwrap_or(0);
            let subtotal = unit * u64::from(line.quantity);
            total += subtotal;
            println!(
                "  {:<8} {:<4} x{:<3} {}",
                line.item_id,
                line.size,
                line.quantity,
                money(subtotal)
            );
        }
        println!(
            "  {} items, total {}",
            cart.item_count(),
            style(money(total)).bold()
        );
    }

    fn print_orders(&self) {
        let Some(orders) = self.auth.caches().orders() else {
            self.print_dim("Sign in to see your orders");
            return;
        };
        if orders.is_empty() {
            self.print_dim("No orders yet");
            return;
        }

        for order in orders.iter() {
            println!(
                "  {} {} {:<10} {}",
                style(order.id.get(..8).unwrap_or(&order.id)).cyan(),
                order.created_at.format("%Y-%m-%d %H:%M"),
                order.status.to_string(),
                money(order.total_amount)
            );
        }
    }

    fn print_remaining(&self) {
        let session = self.auth.session();
        if !session.is_active() {
            self.print_dim("No active session");
            return;
        }
        let remaining = session.get_remaining_time();
        println!(
            "Session: {:?}, expires in {}s",
            session.status(),
            remaining.div_ceil(1000)
        );
    }

    fn print_usage(&self, usage: &str) {
        self.print_dim(&format!("Usage: {}", usage));
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_success(&self, msg: &str) {
        let green = Style::new().green();
        println!("{} {}", green.apply_to("✓"), msg);
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}
