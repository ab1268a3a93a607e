//! Table definitions, seed data and upgrade scripts.
//!
//! The tables are created automatically when the database file is empty.
//! `CUR_VERSION` is stored in the `version` table; bump it when making
//! schema changes and add the matching upgrade statements to `SQL_UPGRADES`.

/// Logical schema version written to the `version` table.
pub const CUR_VERSION: i64 = 1;

pub const SQL_TABLES: &[&str] = &[
    r#"
    CREATE TABLE version (
        version VARCHAR(100) NOT NULL,
        PRIMARY KEY (version)
    )
    "#,
    r#"
    CREATE TABLE active_monitors (
        id INTEGER PRIMARY KEY NOT NULL,
        def_id INT NOT NULL,
        state VARCHAR(10) NOT NULL,
        state_ts INT NOT NULL,
        msg VARCHAR(200) NOT NULL,
        alert_id INT NULL,
        deleted BOOLEAN NOT NULL DEFAULT 0,
        checks_enabled BOOLEAN NOT NULL DEFAULT 1,
        alerts_enabled BOOLEAN NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE active_monitor_args (
        id INTEGER PRIMARY KEY NOT NULL,
        monitor_id INT NOT NULL,
        name VARCHAR(20),
        value VARCHAR(100)
    )
    "#,
    "CREATE INDEX active_monitor_args_monitor_id_idx ON active_monitor_args(monitor_id)",
    r#"
    CREATE TABLE active_monitor_alerts (
        id INTEGER PRIMARY KEY NOT NULL,
        monitor_id INT NOT NULL,
        start_ts INT NOT NULL,
        end_ts INT NOT NULL,
        alert_msg VARCHAR(200) NOT NULL
    )
    "#,
    "CREATE INDEX active_monitor_alerts_monitor_id_idx ON active_monitor_alerts(monitor_id)",
    r#"
    CREATE TABLE active_monitor_defs (
        id INTEGER PRIMARY KEY NOT NULL,
        name VARCHAR(50),
        description VARCHAR(100),
        active BOOLEAN,
        cmdline_filename VARCHAR(50),
        cmdline_args_tmpl VARCHAR(1000),
        description_tmpl VARCHAR(100)
    )
    "#,
    r#"
    CREATE TABLE active_monitor_def_args (
        id INTEGER PRIMARY KEY NOT NULL,
        active_monitor_def_id INT NOT NULL,
        name VARCHAR(20),
        display_name VARCHAR(30),
        description VARCHAR(100),
        required BOOLEAN,
        default_value VARCHAR(50)
    )
    "#,
    "CREATE INDEX monitor_def_id_idx ON active_monitor_def_args(active_monitor_def_id)",
    r#"
    CREATE TABLE active_monitor_contacts (
        active_monitor_id INT NOT NULL,
        contact_id INT NOT NULL,
        PRIMARY KEY (active_monitor_id, contact_id)
    )
    "#,
    r#"
    CREATE TABLE active_monitor_contact_groups (
        active_monitor_id INT NOT NULL,
        contact_group_id INT NOT NULL,
        PRIMARY KEY (active_monitor_id, contact_group_id)
    )
    "#,
    r#"
    CREATE TABLE contacts (
        id INTEGER PRIMARY KEY NOT NULL,
        name VARCHAR(100) NULL,
        email VARCHAR(100) NULL,
        phone VARCHAR(100) NULL,
        active BOOLEAN
    )
    "#,
    r#"
    CREATE TABLE contact_groups (
        id INTEGER PRIMARY KEY NOT NULL,
        name VARCHAR(100),
        active BOOLEAN
    )
    "#,
    r#"
    CREATE TABLE contact_group_contacts (
        contact_group_id INT NOT NULL,
        contact_id INT NOT NULL,
        PRIMARY KEY (contact_group_id, contact_id)
    )
    "#,
    r#"
    CREATE TABLE object_metadata (
        object_type VARCHAR(30),
        object_id INT NOT NULL,
        key VARCHAR(30) NOT NULL,
        value VARCHAR(100) NOT NULL,
        PRIMARY KEY (object_type, object_id, key)
    )
    "#,
    "CREATE INDEX object_metadata_key_value_idx ON object_metadata(key, value)",
    r#"
    CREATE TABLE object_bindata (
        object_type VARCHAR(30),
        object_id INT NOT NULL,
        key VARCHAR(30) NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (object_type, object_id, key)
    )
    "#,
    r#"
    CREATE TABLE monitor_groups (
        id INTEGER PRIMARY KEY NOT NULL,
        parent_id INT NULL,
        name VARCHAR(100)
    )
    "#,
    "CREATE INDEX monitor_groups_parent_idx ON monitor_groups(parent_id)",
    r#"
    CREATE TABLE monitor_group_active_monitors (
        monitor_group_id INT NOT NULL,
        active_monitor_id INT NOT NULL,
        PRIMARY KEY (monitor_group_id, active_monitor_id)
    )
    "#,
    "CREATE INDEX monitor_group_active_monitors_monitor_idx \
     ON monitor_group_active_monitors(active_monitor_id)",
    r#"
    CREATE TABLE monitor_group_contacts (
        monitor_group_id INT NOT NULL,
        contact_id INT NOT NULL,
        PRIMARY KEY (monitor_group_id, contact_id)
    )
    "#,
    r#"
    CREATE TABLE monitor_group_contact_groups (
        monitor_group_id INT NOT NULL,
        contact_group_id INT NOT NULL,
        PRIMARY KEY (monitor_group_id, contact_group_id)
    )
    "#,
];

/// Built-in monitor definitions shipped with a fresh database.
pub const SQL_SEED_DEFS: &[&str] = &[
    r#"INSERT INTO active_monitor_defs (name, description, active, cmdline_filename,
        cmdline_args_tmpl, description_tmpl)
        VALUES (
            'Ping monitor',
            'Monitor an IP using ICMP echo request packets.',
            1,
            '/usr/lib/nagios/plugins/check_ping',
            '-H {{hostname}} -w {{rtt}},{{pl}}% -c {{rtt}},{{pl}}%',
            'Ping monitor for {{hostname}}'
        )"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (1, 'hostname', 'IP address', 'IP to monitor', 1, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (1, 'rtt', 'Max round trip time',
            'The maximum permitted round trip time in miliseconds', 0, '500')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (1, 'pl', 'Max packet loss', 'The maximum permitted packet loss in percent', 0, '50')"#,
    r#"INSERT INTO active_monitor_defs (name, description, active, cmdline_filename,
        cmdline_args_tmpl, description_tmpl)
        VALUES (
            'HTTP monitor',
            'Monitor a website.',
            1,
            '/usr/lib/nagios/plugins/check_http',
            '-I {{hostname}}{%if vhost%} -H {{vhost}}{%endif%} -f follow{%if match%} -s "{{match}}"{%endif%}{%if ssl%} -S --sni{%endif%}{%if url%} -u {{url}}{%endif%}',
            'HTTP monitor for {%if vhost%}{{vhost}}{%else%}{{hostname}}{%endif%}'
        )"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (2, 'hostname', 'Hostname of server/site', 'The hostname of the site to monitor', 1, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (2, 'vhost', 'Virtual host', 'The virtual host to monitor', 0, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (2, 'match', 'Match string', 'Match a string in the returned site data', 0, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (2, 'ssl', 'Use HTTPS/SSL', 'Use HTTP/SSL monitoring', 0, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (2, 'url', 'Url to monitor', 'Monitor a specific URL', 0, '/')"#,
    r#"INSERT INTO active_monitor_defs (name, description, active, cmdline_filename,
        cmdline_args_tmpl, description_tmpl)
        VALUES (
            'HTTPS certificate monitor',
            'Monitor a websites SSL certificate.',
            1,
            '/usr/lib/nagios/plugins/check_http',
            '-I {{hostname}}{%if vhost%} -H {{vhost}}{%endif%} -C {{age}},{{age}} --sni',
            'HTTP SSL cert monitor for {%if vhost%}{{vhost}}{%else%}{{hostname}}{%endif%}'
        )"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (3, 'hostname', 'Hostname of server/site', 'The hostname of the site to monitor', 1, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (3, 'vhost', 'Virtual host', 'The virtual host to monitor', 0, '')"#,
    r#"INSERT INTO active_monitor_def_args
        (active_monitor_def_id, name, display_name, description, required, default_value)
        VALUES (3, 'age', 'Certificate max age', 'The max age (in days) of the site certificate', 0, '14')"#,
];

/// A default monitor created alongside the seed definitions.
pub const SQL_SEED_MONITORS: &[&str] = &[
    "INSERT INTO active_monitors (def_id, state, state_ts, msg) VALUES (1, 'UNKNOWN', 0, '')",
    "INSERT INTO active_monitor_args (monitor_id, name, value) VALUES (1, 'hostname', '127.0.0.1')",
];

/// Upgrade statements keyed by target version, applied in ascending order
/// for every version greater than the stored one.
pub const SQL_UPGRADES: &[(i64, &[&str])] = &[];
