use std::{
    fs,
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use stockdesk::{
    auth::Actor,
    config::{self, ClientConfig},
    events::EventSender,
    models::{
        IncomingGoodsHeader, ItemId, OutgoingGoodsHeader, PurchaseOrderHeader, SupplierId,
        Transaction, TransactionHeader, TransactionId,
    },
    services::{
        ApiClient, HttpReferenceProvider, HttpTransactionApi, LifecycleController, LineView,
        NoticeLevel, OutcomeView, ReferenceCache, TransactionView,
    },
};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(&cli).await?;

    match cli.command {
        Commands::Incoming(command) => {
            let action = Action::<IncomingHeaderArgs>::from(command);
            run_command::<IncomingGoodsHeader, _>(&context, action, cli.json).await?
        }
        Commands::Outgoing(command) => {
            let action = Action::<OutgoingHeaderArgs>::from(command);
            run_command::<OutgoingGoodsHeader, _>(&context, action, cli.json).await?
        }
        Commands::PurchaseOrders(command) => {
            let action = Action::<PurchaseOrderHeaderArgs>::from(command);
            run_command::<PurchaseOrderHeader, _>(&context, action, cli.json).await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "stockdesk",
    version,
    about = "Manage warehouse inventory transactions from the command line"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[arg(long, global = true, help = "Act as this user id instead of the configured one")]
    actor: Option<String>,
    #[arg(long, global = true, help = "Role of the acting user")]
    role: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand, about = "Goods received from suppliers")]
    Incoming(IncomingCommands),
    #[command(subcommand, about = "Goods issued from the warehouse")]
    Outgoing(OutgoingCommands),
    #[command(subcommand, name = "purchase-orders", about = "Orders placed with suppliers")]
    PurchaseOrders(PurchaseOrderCommands),
}

#[derive(Subcommand)]
enum IncomingCommands {
    List(ListArgs),
    View(ViewArgs),
    Create {
        #[command(flatten)]
        header: IncomingHeaderArgs,
        #[command(flatten)]
        lines: LineArgs,
    },
    Edit {
        id: String,
        #[command(flatten)]
        header: IncomingHeaderArgs,
        #[command(flatten)]
        lines: LineArgs,
        #[arg(long = "remove-item", help = "Drop the line for this item id")]
        remove_items: Vec<String>,
    },
    Submit(ConfirmArgs),
    Delete(ConfirmArgs),
}

#[derive(Subcommand)]
enum OutgoingCommands {
    List(ListArgs),
    View(ViewArgs),
    Create {
        #[command(flatten)]
        header: OutgoingHeaderArgs,
        #[command(flatten)]
        lines: LineArgs,
    },
    Edit {
        id: String,
        #[command(flatten)]
        header: OutgoingHeaderArgs,
        #[command(flatten)]
        lines: LineArgs,
        #[arg(long = "remove-item", help = "Drop the line for this item id")]
        remove_items: Vec<String>,
    },
    Submit(ConfirmArgs),
    Delete(ConfirmArgs),
}

#[derive(Subcommand)]
enum PurchaseOrderCommands {
    List(ListArgs),
    View(ViewArgs),
    Create {
        #[command(flatten)]
        header: PurchaseOrderHeaderArgs,
        #[command(flatten)]
        lines: LineArgs,
    },
    Edit {
        id: String,
        #[command(flatten)]
        header: PurchaseOrderHeaderArgs,
        #[command(flatten)]
        lines: LineArgs,
        #[arg(long = "remove-item", help = "Drop the line for this item id")]
        remove_items: Vec<String>,
    },
    Submit(ConfirmArgs),
    Delete(ConfirmArgs),
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, help = "Case-insensitive search over the kind's search fields")]
    search: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Only show drafts")]
    drafts: bool,
}

#[derive(Args)]
struct ViewArgs {
    id: String,
    #[arg(long, help = "Write the decoded approval signature to this file")]
    signature_out: Option<PathBuf>,
}

struct CreateArgs<P> {
    header: P,
    lines: LineArgs,
}

struct EditArgs<P> {
    id: String,
    header: P,
    lines: LineArgs,
    remove_items: Vec<String>,
}

#[derive(Args)]
struct LineArgs {
    #[arg(
        long = "item",
        value_parser = parse_line,
        help = "Line to add as ITEM_ID:QUANTITY (repeatable)"
    )]
    items: Vec<LineArg>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct ConfirmArgs {
    id: String,
    #[arg(long, action = ArgAction::SetTrue, help = "Skip the confirmation prompt")]
    yes: bool,
}

#[derive(Args)]
struct IncomingHeaderArgs {
    #[arg(long)]
    supplier: Option<String>,
    #[arg(long)]
    reference: Option<String>,
    #[arg(long, help = "Receipt date (YYYY-MM-DD), defaults to today")]
    received_at: Option<NaiveDate>,
}

#[derive(Args)]
struct OutgoingHeaderArgs {
    #[arg(long)]
    destination: Option<String>,
    #[arg(long)]
    recipient: Option<String>,
}

#[derive(Args)]
struct PurchaseOrderHeaderArgs {
    #[arg(long)]
    supplier: Option<String>,
    #[arg(long, help = "Expected delivery date (YYYY-MM-DD), defaults to today")]
    expected_date: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
struct LineArg {
    item_id: String,
    quantity: i64,
}

fn parse_line(raw: &str) -> Result<LineArg, String> {
    let (item_id, quantity) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected ITEM_ID:QUANTITY, got '{}'", raw))?;
    let quantity = quantity
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid quantity '{}': {}", quantity, e))?;
    Ok(LineArg {
        item_id: item_id.trim().to_string(),
        quantity,
    })
}

/// Header flags that overwrite the draft header field by field.
trait ApplyHeader<H> {
    fn apply(&self, header: &mut H);
}

impl ApplyHeader<IncomingGoodsHeader> for IncomingHeaderArgs {
    fn apply(&self, header: &mut IncomingGoodsHeader) {
        if let Some(supplier) = &self.supplier {
            header.supplier_id = SupplierId::from(supplier.as_str());
        }
        if let Some(reference) = &self.reference {
            header.reference_number = reference.clone();
        }
        if let Some(date) = self.received_at {
            header.received_at = date;
        }
    }
}

impl ApplyHeader<OutgoingGoodsHeader> for OutgoingHeaderArgs {
    fn apply(&self, header: &mut OutgoingGoodsHeader) {
        if let Some(destination) = &self.destination {
            header.destination = destination.clone();
        }
        if let Some(recipient) = &self.recipient {
            header.recipient_name = recipient.clone();
        }
    }
}

impl ApplyHeader<PurchaseOrderHeader> for PurchaseOrderHeaderArgs {
    fn apply(&self, header: &mut PurchaseOrderHeader) {
        if let Some(supplier) = &self.supplier {
            header.supplier_id = SupplierId::from(supplier.as_str());
        }
        if let Some(date) = self.expected_date {
            header.expected_date = date;
        }
    }
}

/// Kind-independent form of the per-kind subcommands.
enum Action<P> {
    List(ListArgs),
    View(ViewArgs),
    Create(CreateArgs<P>),
    Edit(EditArgs<P>),
    Submit(ConfirmArgs),
    Delete(ConfirmArgs),
}

macro_rules! impl_into_action {
    ($commands:ident, $header:ty) => {
        impl From<$commands> for Action<$header> {
            fn from(command: $commands) -> Self {
                match command {
                    $commands::List(args) => Action::List(args),
                    $commands::View(args) => Action::View(args),
                    $commands::Create { header, lines } => {
                        Action::Create(CreateArgs { header, lines })
                    }
                    $commands::Edit {
                        id,
                        header,
                        lines,
                        remove_items,
                    } => Action::Edit(EditArgs {
                        id,
                        header,
                        lines,
                        remove_items,
                    }),
                    $commands::Submit(args) => Action::Submit(args),
                    $commands::Delete(args) => Action::Delete(args),
                }
            }
        }
    };
}

impl_into_action!(IncomingCommands, IncomingHeaderArgs);
impl_into_action!(OutgoingCommands, OutgoingHeaderArgs);
impl_into_action!(PurchaseOrderCommands, PurchaseOrderHeaderArgs);

struct CliContext {
    client: Arc<ApiClient>,
    references: Arc<ReferenceCache>,
    events: EventSender,
    actor: Actor,
}

impl CliContext {
    async fn initialize(cli: &Cli) -> Result<Self> {
        let mut config = config::load_config().context("failed to load client config")?;
        config::init_tracing(&config.log_level, config.log_json);

        if let Some(actor) = &cli.actor {
            config.actor_id = Some(actor.clone());
        }
        if let Some(role) = &cli.role {
            config.actor_role = role.clone();
        }
        let actor = resolve_actor(&config)?;

        let client = Arc::new(ApiClient::from_config(&config).context("failed to build API client")?);
        let events = EventSender::new(config.event_channel_capacity);
        let references = Arc::new(
            ReferenceCache::new(Arc::new(HttpReferenceProvider::new(client.clone())))
                .with_events(events.clone()),
        );
        if let Err(err) = references.refresh().await {
            warn!(error = %err, "reference data unavailable, names will show as Unknown");
        }

        Ok(Self {
            client,
            references,
            events,
            actor,
        })
    }

    fn controller<H: TransactionHeader>(&self) -> Result<LifecycleController<H>> {
        let api = Arc::new(HttpTransactionApi::<H>::new(self.client.clone()));
        let controller = LifecycleController::new(
            api,
            self.references.clone(),
            self.actor.clone(),
            self.events.clone(),
        )?;
        Ok(controller)
    }
}

fn resolve_actor(config: &ClientConfig) -> Result<Actor> {
    config
        .actor()
        .context("set APP__ACTOR_ID or pass --actor to identify yourself")
}

async fn run_command<H, P>(context: &CliContext, action: Action<P>, json: bool) -> Result<()>
where
    H: TransactionHeader,
    P: ApplyHeader<H>,
{
    let controller = context.controller::<H>()?;
    let loaded = controller.refresh().await;
    flush_notices(&controller);
    loaded.with_context(|| format!("failed to load {}s", H::CONFIG.label.to_lowercase()))?;

    let result = match action {
        Action::List(args) => handle_list(&controller, args, json),
        Action::View(args) => handle_view(&controller, args, json),
        Action::Create(args) => handle_create(&controller, args, json).await,
        Action::Edit(args) => handle_edit(&controller, args, json).await,
        Action::Submit(args) => handle_submit(&controller, args, json).await,
        Action::Delete(args) => handle_delete(&controller, args).await,
    };
    flush_notices(&controller);
    result
}

fn handle_list<H: TransactionHeader>(
    controller: &LifecycleController<H>,
    args: ListArgs,
    json: bool,
) -> Result<()> {
    let mut transactions = controller.search(args.search.as_deref().unwrap_or_default());
    if args.drafts {
        transactions.retain(Transaction::is_editable);
    }

    let refs = controller.references().snapshot();
    let views: Vec<TransactionView<H>> = transactions
        .iter()
        .map(|tx| TransactionView::build(tx, &refs))
        .collect();

    if json {
        return print_json(&views);
    }
    if views.is_empty() {
        println!("No {}s found", H::CONFIG.label.to_lowercase());
    }
    for view in &views {
        render_summary(view);
    }
    Ok(())
}

fn handle_view<H: TransactionHeader>(
    controller: &LifecycleController<H>,
    args: ViewArgs,
    json: bool,
) -> Result<()> {
    let id = TransactionId::from(args.id);
    let tx = controller
        .find(&id)
        .ok_or_else(|| anyhow!("{} {} not found", H::CONFIG.label, id))?;
    controller.start_view(&tx);
    let view = controller
        .view()
        .ok_or_else(|| anyhow!("{} {} disappeared while loading", H::CONFIG.label, id))?;

    if let Some(path) = &args.signature_out {
        write_signature(&view, path)?;
    }

    if json {
        print_json(&view)?;
    } else {
        render_detail(&view);
    }
    controller.cancel();
    Ok(())
}

async fn handle_create<H, P>(
    controller: &LifecycleController<H>,
    args: CreateArgs<P>,
    json: bool,
) -> Result<()>
where
    H: TransactionHeader,
    P: ApplyHeader<H>,
{
    controller.start_create();
    controller.edit_header(|header| args.header.apply(header))?;
    fill_lines(controller, &args.lines)?;

    let saved = controller.save().await?;
    render_saved(controller, &saved, json)
}

async fn handle_edit<H, P>(
    controller: &LifecycleController<H>,
    args: EditArgs<P>,
    json: bool,
) -> Result<()>
where
    H: TransactionHeader,
    P: ApplyHeader<H>,
{
    controller.start_edit_by_id(&TransactionId::from(args.id.as_str()))?;
    controller.edit_header(|header| args.header.apply(header))?;
    for item_id in &args.remove_items {
        if !controller.remove_line(&ItemId::from(item_id.as_str())) {
            debug!(item_id = %item_id, "no line to remove");
        }
    }
    fill_lines(controller, &args.lines)?;

    let saved = controller.save().await?;
    render_saved(controller, &saved, json)
}

fn fill_lines<H: TransactionHeader>(
    controller: &LifecycleController<H>,
    lines: &LineArgs,
) -> Result<()> {
    if let Some(notes) = &lines.notes {
        controller.set_notes(notes.as_str())?;
    }
    for line in &lines.items {
        controller.set_pending_line(line.item_id.as_str(), line.quantity);
        controller.add_pending_line()?;
    }
    for line in controller.draft_lines() {
        if line.over_stock {
            eprintln!(
                "warning: {} requests {} but only {} in stock",
                line.item_name, line.quantity, line.stock
            );
        }
    }
    Ok(())
}

async fn handle_submit<H: TransactionHeader>(
    controller: &LifecycleController<H>,
    args: ConfirmArgs,
    json: bool,
) -> Result<()> {
    let id = TransactionId::from(args.id);
    controller.request_submit(&id)?;
    let number = controller.find(&id).map(|tx| tx.number).unwrap_or_default();

    if !args.yes && !prompt(&format!("Submit {} {} for approval?", H::CONFIG.label, number))? {
        controller.cancel();
        println!("Cancelled");
        return Ok(());
    }

    let submitted = controller.confirm_submit().await?;
    if json {
        let refs = controller.references().snapshot();
        print_json(&TransactionView::build(&submitted, &refs))
    } else {
        println!("{} {} is {}", H::CONFIG.label, submitted.number, submitted.status.label());
        Ok(())
    }
}

async fn handle_delete<H: TransactionHeader>(
    controller: &LifecycleController<H>,
    args: ConfirmArgs,
) -> Result<()> {
    let id = TransactionId::from(args.id);
    controller.request_delete(&id)?;
    let number = controller.find(&id).map(|tx| tx.number).unwrap_or_default();

    if !args.yes && !prompt(&format!("Delete {} {}? This cannot be undone.", H::CONFIG.label, number))? {
        controller.cancel();
        println!("Cancelled");
        return Ok(());
    }

    controller.confirm_delete().await?;
    Ok(())
}

fn prompt(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn write_signature<H>(view: &TransactionView<H>, path: &PathBuf) -> Result<()> {
    let signature = match &view.outcome {
        Some(OutcomeView::Approved {
            signature: Some(signature),
            ..
        }) => signature,
        _ => bail!("{} has no approval signature", view.number),
    };
    let bytes = signature
        .decode()
        .ok_or_else(|| anyhow!("signature of {} is not an embedded image", view.number))?;
    fs::write(path, bytes)
        .with_context(|| format!("failed to write signature to {}", path.display()))?;
    println!("Signature written to {}", path.display());
    Ok(())
}

fn flush_notices<H: TransactionHeader>(controller: &LifecycleController<H>) {
    for notice in controller.take_notices() {
        match notice.level {
            NoticeLevel::Success => eprintln!("{}", notice.message),
            NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}

fn render_saved<H: TransactionHeader>(
    controller: &LifecycleController<H>,
    saved: &Transaction<H>,
    json: bool,
) -> Result<()> {
    let refs = controller.references().snapshot();
    let view = TransactionView::build(saved, &refs);
    if json {
        print_json(&view)
    } else {
        render_detail(&view);
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn header_summary<H: TransactionHeader>(header: &H) -> String {
    H::CONFIG
        .required_fields
        .iter()
        .filter_map(|field| header.field_text(*field))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" • ")
}

fn render_summary<H: TransactionHeader>(view: &TransactionView<H>) {
    let party = view
        .supplier
        .clone()
        .unwrap_or_else(|| header_summary(&view.header));
    println!(
        "- {} • {} • {} • {} line(s) • by {} [{}]",
        view.number,
        view.status_label,
        party,
        view.lines.len(),
        view.author,
        view.id
    );
}

fn render_line(line: &LineView) {
    let code = if line.item_code.is_empty() {
        String::new()
    } else {
        format!(" ({})", line.item_code)
    };
    let flag = if line.over_stock { "  ! over stock" } else { "" };
    println!(
        "  • {} x {}{} • stock {}{}",
        line.quantity, line.item_name, code, line.stock, flag
    );
}

fn render_detail<H: TransactionHeader>(view: &TransactionView<H>) {
    println!("{} {} [{}]", H::CONFIG.label, view.number, view.id);
    println!("  status: {}", view.status_label);
    if let Some(supplier) = &view.supplier {
        println!("  supplier: {}", supplier);
    }
    let summary = header_summary(&view.header);
    if !summary.is_empty() {
        println!("  header: {}", summary);
    }
    println!("  created by: {}", view.author);
    if let Some(created_at) = view.created_at {
        println!("  created at: {}", created_at.format("%Y-%m-%d %H:%M"));
    }
    if let Some(notes) = &view.notes {
        println!("  notes: {}", notes);
    }
    for line in &view.lines {
        render_line(line);
    }
    match &view.outcome {
        Some(OutcomeView::Approved {
            approver,
            approved_at,
            signature,
        }) => {
            let at = approved_at
                .map(|at| at.format(" on %Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("  approved by {}{}", approver, at);
            if let Some(signature) = signature {
                println!(
                    "  signature: {}",
                    signature.media_type().unwrap_or("external image")
                );
            }
        }
        Some(OutcomeView::Rejected { reason }) => {
            println!("  rejected: {}", reason);
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_item_lines() {
        let line = parse_line("ITEM-7:12").unwrap();
        assert_eq!(line.item_id, "ITEM-7");
        assert_eq!(line.quantity, 12);
        assert!(parse_line("ITEM-7").is_err());
        assert!(parse_line("ITEM-7:many").is_err());
    }

    #[test]
    fn cli_accepts_outgoing_create() {
        let cli = Cli::try_parse_from([
            "stockdesk",
            "outgoing",
            "create",
            "--destination",
            "IT Department",
            "--recipient",
            "Dana",
            "--item",
            "I1:5",
        ])
        .unwrap();
        match cli.command {
            Commands::Outgoing(OutgoingCommands::Create { header, lines }) => {
                assert_eq!(header.destination.as_deref(), Some("IT Department"));
                assert_eq!(lines.items.len(), 1);
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn header_args_only_touch_given_fields() {
        let args = PurchaseOrderHeaderArgs {
            supplier: None,
            expected_date: NaiveDate::from_ymd_opt(2024, 7, 1),
        };
        let mut header = PurchaseOrderHeader::blank(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        header.supplier_id = SupplierId::from("S1");
        args.apply(&mut header);
        assert_eq!(header.supplier_id, SupplierId::from("S1"));
        assert_eq!(header.expected_date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
    }
}
