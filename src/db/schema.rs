use rusqlite::Connection;

/// Create every table and index. Safe to run on every boot.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Tenants. The master admin (is_master = 1) manages every account;
        -- other admins manage the accounts they created (owner_id).
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            whatsapp TEXT,
            cpf TEXT,
            plan TEXT NOT NULL DEFAULT 'free' CHECK (plan IN ('free', 'pro', 'premium')),
            status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'blocked')),
            role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
            is_master INTEGER NOT NULL DEFAULT 0,
            owner_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            payment_method TEXT NOT NULL DEFAULT 'whatsapp',
            payment_pix_key TEXT,
            payment_instructions TEXT,
            logo TEXT,
            smtp_user TEXT,
            smtp_pass BLOB,                      -- encrypted with the master key
            created_at TEXT,                     -- YYYY-MM-DD
            payment_status TEXT NOT NULL DEFAULT 'pending',
            due_date TEXT,                       -- YYYY-MM-DD, plan renewal date
            asaas_customer_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_users_owner ON users(owner_id);

        -- Login sessions (token stored as a salted SHA-256 hash)
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);

        -- Invoices ("clients" in the dashboard)
        CREATE TABLE IF NOT EXISTS clients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            cpf TEXT,
            product TEXT,
            due_date TEXT NOT NULL,
            value_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'Pendente',
            paid_at TEXT,
            last_reminder_on TEXT,
            last_reminder_kind TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_clients_user_due ON clients(user_id, due_date);
        CREATE INDEX IF NOT EXISTS idx_clients_pending_due ON clients(due_date) WHERE status = 'Pendente';

        -- Recurring invoices
        CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            product TEXT,
            value_cents INTEGER NOT NULL DEFAULT 0,
            day_of_month INTEGER NOT NULL CHECK (day_of_month BETWEEN 1 AND 31),
            status TEXT NOT NULL DEFAULT 'active',
            last_generated_month TEXT           -- YYYY-MM
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);

        -- Shareable invoice preview cards
        CREATE TABLE IF NOT EXISTS invoice_shares (
            id TEXT PRIMARY KEY,
            user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
            client_name TEXT,
            value TEXT,
            due_date TEXT,
            logo TEXT,
            created_at INTEGER NOT NULL,
            invoice_id INTEGER REFERENCES clients(id) ON DELETE CASCADE   -- reminder cards only
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_invoice_shares_invoice ON invoice_shares(invoice_id);

        -- Support tickets
        CREATE TABLE IF NOT EXISTS tickets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            subject TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_user ON tickets(user_id);

        CREATE TABLE IF NOT EXISTS ticket_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket ON ticket_messages(ticket_id);

        -- Platform settings (plan prices, platform PIX key)
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        -- Plan purchases through the PIX gateways
        CREATE TABLE IF NOT EXISTS plan_payments (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            plan TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            gateway TEXT NOT NULL,
            gateway_payment_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'paid', 'failed')),
            pix_code TEXT,
            pix_qr_base64 TEXT,
            created_at INTEGER NOT NULL,
            paid_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_plan_payments_user ON plan_payments(user_id);
        CREATE INDEX IF NOT EXISTS idx_plan_payments_gateway ON plan_payments(gateway, gateway_payment_id);
        "#,
    )
}
