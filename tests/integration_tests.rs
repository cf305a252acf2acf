use bank_statement_importer::*;
use chrono::{NaiveDate, NaiveDateTime};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn reference() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 15)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

/// Single-page PDF; every entry is drawn in its own text object at (x, y).
fn statement_pdf(entries: &[(&str, i64, i64)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = Vec::new();
    for (text, x, y) in entries {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Integer(10)],
        ));
        operations.push(Operation::new(
            "Td",
            vec![Object::Integer(*x), Object::Integer(*y)],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        operations.push(Operation::new("ET", vec![]));
    }
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn bakery_statement() -> Vec<u8> {
    statement_pdf(&[
        ("1.500,00", 450, 700),
        ("Extrato de Conta Corrente", 50, 800),
        ("Sicoob", 400, 800),
        ("PADARIA BOA VISTA LTDA", 50, 780),
        ("CNPJ: 12.345.678/0001-90", 50, 765),
        ("05/01/2024 PIX RECEBIDO CLIENTE", 50, 700),
        ("06/01/2024 PAGAMENTO BOLETO ENERGIA", 50, 686),
        ("-320,45", 450, 686),
        ("07/01/2024 SALDO DO DIA", 50, 672),
        ("0,00", 450, 672),
    ])
}

struct ScriptedExtractor {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedExtractor {
    fn new(replies: Vec<Result<String>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = Self {
            replies: Mutex::new(replies.into()),
            calls: calls.clone(),
        };
        (extractor, calls)
    }
}

#[async_trait::async_trait]
impl RemoteExtractor for ScriptedExtractor {
    async fn extract(&self, _payload: &[u8], _mime_type: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StatementImportError::ExtractionFailed("no reply".into())))
    }
}

fn remote_body(owner: &str, rows: &[(&str, &str, f64)]) -> String {
    let tx: Vec<_> = rows
        .iter()
        .map(|(date, desc, value)| json!({ "d": date, "ds": desc, "v": value }))
        .collect();
    json!({ "h": { "n": owner, "t": "", "b": "Nubank" }, "tx": tx }).to_string()
}

async fn remote_importer(
    store: InMemoryStore,
    replies: Vec<Result<String>>,
) -> (StatementImporter<InMemoryStore>, Arc<AtomicUsize>) {
    let config = ImporterConfig {
        extraction_mode: ExtractionMode::Remote,
        ..Default::default()
    };
    let (extractor, calls) = ScriptedExtractor::new(replies);
    let adapter = RemoteExtractionAdapter::new(Box::new(extractor), &config)
        .with_policy(RetryPolicy::immediate(4))
        .with_reference(reference());
    let importer = StatementImporter::new(store, config)
        .await
        .unwrap()
        .with_remote_adapter(adapter);
    (importer, calls)
}

fn pdf_file(name: &str, bytes: Vec<u8>) -> StatementFile {
    StatementFile::new(name, "application/pdf", bytes)
}

fn row(id: &str, day: u32, amount: f64) -> Transaction {
    let header = StatementHeader {
        owner_name: "Ana Souza".to_string(),
        owner_tax_id: String::new(),
        owner_bank: "X".to_string(),
    };
    let date = NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let mut tx = Transaction::manual_balance(&header, date, amount, "row");
    tx.id = id.to_string();
    tx.transaction_type = TransactionType::Outflow;
    tx.counterparty_name = "Y".to_string();
    tx
}

#[tokio::test]
async fn test_local_pdf_import_end_to_end() {
    let config = ImporterConfig {
        extraction_mode: ExtractionMode::Local,
        ..Default::default()
    };
    let mut importer = StatementImporter::new(InMemoryStore::new(), config)
        .await
        .unwrap()
        .with_reference(reference());

    let report = importer
        .import_batch(&[pdf_file("janeiro.pdf", bakery_statement())], None)
        .await;

    assert!(report.is_complete());
    let file = &report.files[0];
    assert_eq!(file.path, ExtractionPath::Local);
    assert_eq!(file.header.owner_name, "PADARIA BOA VISTA LTDA");
    assert_eq!(file.header.owner_tax_id, "12345678000190");
    assert_eq!(file.header.owner_bank, "Sicoob");

    let stored = importer.store().transactions();
    assert_eq!(stored.len(), 2);
    assert_eq!(report.accepted_transaction_ids().len(), 2);

    let credit = &stored[0];
    assert_eq!(credit.transaction_type, TransactionType::Inflow);
    assert_eq!(credit.amount, 1500.0);
    assert_eq!(credit.payment_method, PaymentMethod::Pix);
    assert_eq!(credit.iso_date(), "2024-01-05T12:00:00");

    let bill = &stored[1];
    assert_eq!(bill.transaction_type, TransactionType::Outflow);
    assert_eq!(bill.amount, 320.45);
    assert_eq!(bill.payment_method, PaymentMethod::Boleto);
    assert_eq!(bill.payer_name, "PADARIA BOA VISTA LTDA");

    let companies = importer.store().companies();
    assert_eq!(companies.len(), 1);
    assert_eq!(companies[0].canonical_name, "PADARIA BOA VISTA LTDA");
    assert_eq!(companies[0].tax_id, "12345678000190");
    assert!(!companies[0].id.is_empty());
}

#[tokio::test]
async fn test_reimporting_same_file_is_rejected_whole() {
    let config = ImporterConfig {
        extraction_mode: ExtractionMode::Local,
        ..Default::default()
    };
    let mut importer = StatementImporter::new(InMemoryStore::new(), config)
        .await
        .unwrap();

    let file = pdf_file("janeiro.pdf", bakery_statement());
    importer.import_batch(&[file.clone()], None).await;

    let (sender, mut receiver) = tokio::sync::mpsc::channel(32);
    let report = importer.import_batch(&[file], Some(sender)).await;

    assert!(report.is_complete());
    assert_eq!(report.rejected_files(), vec!["janeiro.pdf"]);
    assert_eq!(importer.store().transactions().len(), 2);
    assert_eq!(importer.store().companies().len(), 1);

    let mut saw_duplicate_event = false;
    while let Some(event) = receiver.recv().await {
        if matches!(event, ImportEvent::DuplicateBatch { .. }) {
            saw_duplicate_event = true;
        }
        assert!(!matches!(event, ImportEvent::Accepted { .. }));
    }
    assert!(saw_duplicate_event);
}

#[tokio::test]
async fn test_partly_new_file_is_accepted_in_full() {
    let first = remote_body("Ana Souza", &[("2024-01-02", "PIX RECEBIDO", 50.0)]);
    let second = remote_body(
        "Ana Souza",
        &[
            ("2024-01-02", "PIX RECEBIDO", 50.0),
            ("2024-01-03", "PIX RECEBIDO", 70.0),
        ],
    );
    let (mut importer, _) =
        remote_importer(InMemoryStore::new(), vec![Ok(first), Ok(second)]).await;

    let report = importer
        .import_batch(
            &[pdf_file("a.pdf", vec![]), pdf_file("b.pdf", vec![])],
            None,
        )
        .await;

    assert!(report.rejected_files().is_empty());
    assert_eq!(importer.transactions().len(), 3);
}

#[tokio::test]
async fn test_failed_file_keeps_earlier_files_committed() {
    let replies = vec![
        Ok(remote_body("Ana Souza", &[("2024-01-02", "PIX RECEBIDO", 50.0)])),
        Err(StatementImportError::ExtractionFailed("status 400: bad request".into())),
        Ok(remote_body("Ana Souza", &[("2024-01-09", "PIX RECEBIDO", 10.0)])),
    ];
    let (mut importer, calls) = remote_importer(InMemoryStore::new(), replies).await;

    let files = [
        pdf_file("one.pdf", vec![]),
        pdf_file("two.pdf", vec![]),
        pdf_file("three.pdf", vec![]),
    ];
    let (sender, mut receiver) = tokio::sync::mpsc::channel(32);
    let report = importer.import_batch(&files, Some(sender)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.files.len(), 1);
    let failure = report.aborted.expect("batch should abort");
    assert_eq!(failure.name, "two.pdf");
    assert!(matches!(failure.error, StatementImportError::ExtractionFailed(_)));

    // No rollback: the first file's rows and directory entry stay stored.
    assert_eq!(importer.store().transactions().len(), 1);
    assert_eq!(importer.store().companies().len(), 1);

    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(ImportEvent::Starting { files: 3 })));
    assert!(matches!(
        events.last(),
        Some(ImportEvent::Finished {
            processed: 1,
            aborted: true
        })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, ImportEvent::Failed { name, .. } if name == "two.pdf")));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ImportEvent::FileStarted { name, .. } if name == "three.pdf")));
}

#[tokio::test]
async fn test_overload_retries_are_bounded() {
    let replies = (0..10)
        .map(|_| Err(StatementImportError::Overloaded("status 503: overloaded".into())))
        .collect();
    let (mut importer, calls) = remote_importer(InMemoryStore::new(), replies).await;

    let report = importer
        .import_batch(&[pdf_file("busy.pdf", vec![])], None)
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let failure = report.aborted.expect("batch should abort");
    assert!(matches!(failure.error, StatementImportError::Overloaded(_)));
    assert!(importer.store().transactions().is_empty());
}

#[tokio::test]
async fn test_truncated_response_asks_to_split_the_file() {
    let replies = vec![Ok("```json\n{\"h\": {\"n\": \"Ana\"}, \"tx\": [{\"d\": \"2024-01".to_string())];
    let (mut importer, _) = remote_importer(InMemoryStore::new(), replies).await;

    let report = importer
        .import_batch(&[pdf_file("huge.pdf", vec![])], None)
        .await;

    let failure = report.aborted.expect("batch should abort");
    assert!(matches!(
        failure.error,
        StatementImportError::ResponseTooComplex { .. }
    ));
    assert!(failure.error.to_string().contains("Split the file"));
    assert!(importer.store().transactions().is_empty());
}

#[tokio::test]
async fn test_directory_sync_matches_alternates_and_collapses_new_names() {
    let mut acme = Company::new("Acme Ltd", "11222333000144");
    acme.id = "acme".to_string();
    acme.alternative_names.push("ACME".to_string());
    let store = InMemoryStore::with_records(Vec::new(), vec![acme]);

    let known = remote_body("  acme ", &[("2024-02-01", "PIX RECEBIDO", 10.0)]);
    let rows: Vec<(&str, &str, f64)> = vec![
        ("2024-02-01", "PIX RECEBIDO", 1.0),
        ("2024-02-02", "PIX RECEBIDO", 2.0),
        ("2024-02-03", "PIX RECEBIDO", 3.0),
        ("2024-02-04", "PIX RECEBIDO", 4.0),
        ("2024-02-05", "PIX RECEBIDO", 5.0),
    ];
    let new_name = remote_body("Acme Corp", &rows);
    let (mut importer, _) = remote_importer(store, vec![Ok(known), Ok(new_name)]).await;

    let report = importer
        .import_batch(
            &[pdf_file("acme.pdf", vec![]), pdf_file("corp.pdf", vec![])],
            None,
        )
        .await;
    assert!(report.is_complete());

    let companies = importer.store().companies();
    assert_eq!(companies.len(), 2);
    assert_eq!(companies[1].canonical_name, "Acme Corp");
    assert!(companies[1].alternative_names.is_empty());
    assert!(!companies[1].hidden);

    match &report.files[1].outcome {
        FileOutcome::Accepted { new_companies, .. } => {
            assert_eq!(new_companies, &vec!["Acme Corp".to_string()])
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_marking_and_single_row_removal() {
    let a = row("a", 1, 100.0);
    let b = row("b", 1, 100.0);
    let c = row("c", 2, 100.0);
    let store = InMemoryStore::with_records(vec![a, b, c], Vec::new());
    let mut importer = StatementImporter::new(store, ImporterConfig::default())
        .await
        .unwrap();

    let view = TransactionFilter::default();
    let groups = importer.duplicates(&view);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].transaction_ids, vec!["a", "b"]);

    let refused = importer.remove_duplicate("c", &view).await;
    assert!(matches!(refused, Err(StatementImportError::NotADuplicate(_))));

    importer.remove_duplicate("a", &view).await.unwrap();
    assert_eq!(importer.store().transactions().len(), 2);
    assert!(importer.duplicates(&view).is_empty());

    // The surviving copy is no longer flagged.
    assert!(importer.remove_duplicate("b", &view).await.is_err());
}

#[tokio::test]
async fn test_user_edits_are_persisted() -> anyhow::Result<()> {
    let mut acme = Company::new("Acme Ltd", "");
    acme.id = "acme".to_string();
    let store = InMemoryStore::with_records(vec![row("a", 1, 10.0)], vec![acme]);
    let mut importer = StatementImporter::new(store, ImporterConfig::default()).await?;

    let patch = TransactionPatch {
        notes: Some("conferido".to_string()),
        counterparty_name: Some("Mercado Central".to_string()),
        ..Default::default()
    };
    importer.edit_transaction("a", &patch).await?;
    assert_eq!(importer.store().transactions()[0].notes, "conferido");
    assert_eq!(importer.transactions()[0].counterparty_name, "Mercado Central");

    importer
        .edit_company(&CompanyEdit::Rename {
            target: "acme ltd".to_string(),
            new_name: "Acme Holding".to_string(),
        })
        .await?;
    importer
        .edit_company(&CompanyEdit::Register {
            canonical_name: "Beta SA".to_string(),
            tax_id: String::new(),
            alternative_names: vec!["BETA".to_string()],
        })
        .await?;

    let stored = importer.store().companies();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].canonical_name, "Acme Holding");
    assert_eq!(stored[0].original_name.as_deref(), Some("Acme Ltd"));
    assert!(!stored[1].id.is_empty());
    assert_eq!(importer.companies()[1].id, stored[1].id);

    let balance_id = importer
        .record_manual_balance(
            &StatementHeader::default(),
            reference(),
            -1_000.0,
            "Saldo inicial",
        )
        .await?;
    let balance = importer
        .transactions()
        .iter()
        .find(|t| t.id == balance_id)
        .ok_or_else(|| anyhow::anyhow!("manual balance not stored"))?;
    assert_eq!(balance.transaction_type, TransactionType::ManualBalance);
    assert_eq!(balance.amount, 1_000.0);
    Ok(())
}

#[test]
fn test_layout_reconstruction_is_deterministic() {
    let fragments = vec![
        PositionedFragment::new("-12,90", 450.0, 600.0),
        PositionedFragment::new("04/05 TARIFA", 50.0, 602.0),
        PositionedFragment::new("03/05 PIX RECEBIDO", 50.0, 620.0),
        PositionedFragment::new("80,00", 450.0, 619.0),
    ];
    let reconstructor = LayoutReconstructor::default();

    let first = reconstructor.reconstruct_document(&[fragments.clone()]).text();
    let second = reconstructor.reconstruct_document(&[fragments]).text();
    assert_eq!(first, second);
    assert_eq!(first, "03/05 PIX RECEBIDO 80,00\n04/05 TARIFA -12,90");
}

#[test]
fn test_pdf_helper_round_trips_through_fragments() {
    let pages = bank_statement_importer::pdf::extract_fragments(&bakery_statement()).unwrap();
    assert_eq!(pages.len(), 1);
    assert!(pages[0]
        .iter()
        .any(|f| f.text == "PADARIA BOA VISTA LTDA" && f.x == 50.0 && f.y == 780.0));
}
