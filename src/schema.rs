// Tables belong to the native app, which names them in CamelCase.  SQLite
// resolves identifiers case-insensitively, so the lowercase names match.

table! {
    account (key) {
        key -> Integer,
        name -> Text,
        currency -> Nullable<Text>,
        #[sql_name = "deviceIdKey"]
        device_id_key -> Nullable<Integer>,
        #[sql_name = "deviceKey"]
        device_key -> Nullable<Integer>,
    }
}

table! {
    category (key) {
        key -> Integer,
        name -> Text,
        #[sql_name = "deviceIdKey"]
        device_id_key -> Nullable<Integer>,
        #[sql_name = "deviceKey"]
        device_key -> Nullable<Integer>,
    }
}

table! {
    subcategory (key) {
        key -> Integer,
        name -> Text,
        #[sql_name = "catKey"]
        cat_key -> Integer,
        #[sql_name = "deviceIdKey"]
        device_id_key -> Nullable<Integer>,
        #[sql_name = "deviceKey"]
        device_key -> Nullable<Integer>,
    }
}

table! {
    expense (key) {
        key -> Integer,
        date -> Text,
        #[sql_name = "catKey"]
        cat_key -> Integer,
        #[sql_name = "subCatKey"]
        sub_cat_key -> Integer,
        amount -> Double,
        periods -> Integer,
        notes -> Nullable<Text>,
        #[sql_name = "isDetailEntry"]
        is_detail_entry -> Text,
        #[sql_name = "masterKey"]
        master_key -> Integer,
        #[sql_name = "includesReceipt"]
        includes_receipt -> Text,
        #[sql_name = "payFrom"]
        pay_from -> Integer,
        #[sql_name = "payeeKey"]
        payee_key -> Integer,
        #[sql_name = "billKey"]
        bill_key -> Integer,
        #[sql_name = "deviceIdKey"]
        device_id_key -> Nullable<Integer>,
        #[sql_name = "deviceKey"]
        device_key -> Nullable<Integer>,
        #[sql_name = "timeStamp"]
        time_stamp -> Text,
        currency -> Nullable<Text>,
        #[sql_name = "currencyAmount"]
        currency_amount -> Nullable<Text>,
        #[sql_name = "recurringKey"]
        recurring_key -> Integer,
        #[sql_name = "isCategorySplit"]
        is_category_split -> Text,
    }
}

table! {
    income (key) {
        key -> Integer,
        date -> Text,
        name -> Text,
        amount -> Double,
        notes -> Nullable<Text>,
        #[sql_name = "addIncomeTo"]
        add_income_to -> Integer,
        #[sql_name = "deviceIdKey"]
        device_id_key -> Nullable<Integer>,
        #[sql_name = "deviceKey"]
        device_key -> Nullable<Integer>,
        #[sql_name = "timeStamp"]
        time_stamp -> Text,
        currency -> Nullable<Text>,
        #[sql_name = "currencyAmount"]
        currency_amount -> Nullable<Text>,
    }
}

table! {
    transfer (key) {
        key -> Integer,
        #[sql_name = "transferDate"]
        date -> Text,
        #[sql_name = "fromAccount"]
        from_account -> Integer,
        #[sql_name = "toAccount"]
        to_account -> Integer,
        amount -> Double,
        notes -> Nullable<Text>,
        #[sql_name = "deviceIdKey"]
        device_id_key -> Nullable<Integer>,
        #[sql_name = "deviceKey"]
        device_key -> Nullable<Integer>,
        currency -> Nullable<Text>,
        #[sql_name = "currencyAmount"]
        currency_amount -> Nullable<Text>,
    }
}

table! {
    accounttrans (key) {
        key -> Integer,
        #[sql_name = "accountKey"]
        account_key -> Integer,
        #[sql_name = "timeStamp"]
        time_stamp -> Text,
        #[sql_name = "transType"]
        trans_type -> Integer,
        #[sql_name = "transKey"]
        trans_key -> Integer,
        #[sql_name = "transDate"]
        trans_date -> Text,
        #[sql_name = "transAmount"]
        trans_amount -> Double,
        checked -> Text,
    }
}

table! {
    deviceinfo (key) {
        key -> Integer,
        #[sql_name = "deviceId"]
        device_id -> Text,
        #[sql_name = "isPrimary"]
        is_primary -> Text,
        #[sql_name = "isActive"]
        is_active -> Text,
    }
}

table! {
    settings (key) {
        key -> Integer,
        currency -> Nullable<Text>,
    }
}

table! {
    syncupdate (key) {
        key -> Integer,
        #[sql_name = "updateType"]
        update_type -> Text,
        uuid -> Text,
        payload -> Text,
    }
}
