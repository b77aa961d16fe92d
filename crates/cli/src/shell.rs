//! Interactive command loop.
//!
//! Each input line is parsed with clap into a [`ShellCommand`] and turned
//! into one or more storefront intents. Failures are printed and the loop
//! carries on; nothing a command does can end the session except `quit`.

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use shopfront_client::{ClientError, CommerceApi, Storefront};
use shopfront_core::ProductId;

use crate::render;

#[derive(Debug, Error)]
enum ShellError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One line of shell input.
#[derive(Debug, Parser)]
#[command(
    name = "shopfront",
    no_binary_name = true,
    disable_version_flag = true,
    help_template = "Commands:\n{subcommands}"
)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum ShellCommand {
    /// List products (cached)
    Products,
    /// Re-fetch the product listing
    Refresh,
    /// Log in
    Login { email: String, password: String },
    /// Create an account
    Register {
        email: String,
        password: String,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        full_name: Vec<String>,
    },
    /// Log out
    Logout,
    /// Show who is logged in
    Whoami,
    /// Load and show the cart
    Cart,
    /// Add a product to the cart
    Add {
        product_id: String,
        #[arg(default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product from the cart
    Remove { product_id: String },
    /// Place an order for the cart
    Checkout {
        #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
        address: Vec<String>,
    },
    /// List your orders
    Orders,
    /// Leave the shell
    #[command(alias = "exit")]
    Quit,
}

impl ShellCommand {
    const fn intent(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Refresh => "refresh",
            Self::Login { .. } => "login",
            Self::Register { .. } => "register",
            Self::Logout => "logout",
            Self::Whoami => "whoami",
            Self::Cart => "cart",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Checkout { .. } => "checkout",
            Self::Orders => "orders",
            Self::Quit => "quit",
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. `Ok(None)` for a blank line.
fn parse(line: &str) -> Result<Option<ShellCommand>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    ShellLine::try_parse_from(words).map(|parsed| Some(parsed.command))
}

/// Run the shell on stdin until `quit` or end of input.
///
/// # Errors
///
/// Returns an error if reading stdin or writing stdout fails.
pub async fn run<A: CommerceApi + 'static>(shop: &Storefront<A>) -> io::Result<()> {
    let mut out = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    writeln!(out, "Welcome to Shopfront. Type `help` for commands.")?;
    loop {
        write!(out, "{}", render::prompt(&shop.display_name(), shop.cart().summary()))?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            return Ok(());
        };

        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                write!(out, "{}", e.render())?;
                continue;
            }
        };

        sentry::add_breadcrumb(sentry::Breadcrumb {
            category: Some("intent".into()),
            message: Some(command.intent().into()),
            level: sentry::Level::Info,
            ..Default::default()
        });

        match execute(shop, command, &mut out).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(ShellError::Client(e)) => report(&e, &mut out)?,
            Err(ShellError::Io(e)) => return Err(e),
        }
    }
}

async fn execute<A: CommerceApi + 'static>(
    shop: &Storefront<A>,
    command: ShellCommand,
    out: &mut impl Write,
) -> Result<Flow, ShellError> {
    match command {
        ShellCommand::Products => {
            let listing = shop.catalog().products().await?;
            write!(out, "{}", render::products(&listing, shop.cart().snapshot().as_ref()))?;
        }
        ShellCommand::Refresh => {
            let listing = shop.catalog().refresh().await?;
            write!(out, "{}", render::products(&listing, shop.cart().snapshot().as_ref()))?;
        }
        ShellCommand::Login { email, password } => {
            let session = shop
                .auth()
                .login(&email, &SecretString::from(password))
                .await?;
            writeln!(out, "Welcome, {}!", session.display_name())?;
            if let Err(e) = shop.cart().load_cart().await {
                report(&e, out)?;
            }
        }
        ShellCommand::Register {
            email,
            password,
            full_name,
        } => {
            shop.auth()
                .register(&full_name.join(" "), &email, &SecretString::from(password))
                .await?;
            writeln!(out, "Account created. Log in with `login {email} <password>`.")?;
        }
        ShellCommand::Logout => {
            shop.auth().logout();
            writeln!(out, "Logged out.")?;
        }
        ShellCommand::Whoami => {
            writeln!(out, "{}", shop.display_name())?;
        }
        ShellCommand::Cart => {
            shop.cart().load_cart().await?;
            write!(out, "{}", render::cart(&shop.cart().state()))?;
        }
        ShellCommand::Add {
            product_id,
            quantity,
        } => {
            // Stock is checked against the cached listing; make sure there is one
            shop.catalog().products().await?;
            let product_id = ProductId::new(product_id);
            shop.cart().add_item(&product_id, quantity).await?;
            writeln!(out, "Added {quantity} x {product_id} to cart.")?;

            if let Err(e) = shop.catalog().refresh().await {
                warn!(error = %e, "failed to refresh products after add");
            }
        }
        ShellCommand::Remove { product_id } => {
            let product_id = ProductId::new(product_id);
            shop.cart().remove_item(&product_id).await?;
            writeln!(out, "Removed {product_id} from cart.")?;
        }
        ShellCommand::Checkout { address } => {
            let order = shop.checkout().submit_order(&address.join(" ")).await?;
            writeln!(out, "Order placed successfully!")?;
            write!(out, "{}", render::order(&order))?;

            // The service emptied the cart; the cached copy is stale now
            if let Err(e) = shop.cart().load_cart().await {
                shop.cart().invalidate();
                report(&e, out)?;
            }
        }
        ShellCommand::Orders => {
            let orders = shop.checkout().order_history().await?;
            write!(out, "{}", render::orders(&orders))?;
        }
        ShellCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Print a failed intent; network failures also go to error tracking.
fn report(error: &ClientError, out: &mut impl Write) -> io::Result<()> {
    if error.is_network() {
        sentry::capture_error(error);
    }

    writeln!(out, "Error: {error}")?;
    if error.requires_login() {
        writeln!(out, "Log in with `login <email> <password>`.")?;
    }
    Ok(())
}
